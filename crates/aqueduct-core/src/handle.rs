//! Resource handles.
//!
//! A [`ResourceHandle`] owns exactly one native object, the context token
//! its callbacks carry, and the callback hub that token resolves to.
//! Lifecycle operations are checked against [`crate::lifecycle`] before any
//! native call is made.
//!
//! [`ResourceHandle::teardown`] is the only path that matters for
//! correctness. It runs, in order:
//!
//! 1. unregister the context token (waiting out in-flight callbacks) and
//!    drop native listener registrations,
//! 2. stop, uninitialize, close and dispose the native object,
//! 3. mark the handle `Closed`.
//!
//! Dropping a handle without tearing it down runs the same sequence and
//! logs a warning.

use std::ffi::c_void;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Arc;

use crate::context::ContextToken;
use crate::engine::{CreateArgs, Engine, NativeId, ResourceKind, Target};
use crate::error::{Error, Reason, Result};
use crate::lifecycle::{self, LifecycleState, Operation};
use crate::listeners::{PropertyListener, SubscriptionId};
use crate::property::{PropertyAddress, PropertyData, PropertyInfo};
use crate::status::{self, OsStatus};
use crate::thunk::{self, CallbackDiagnostics, CallbackHub};

/// Owner of one native audio object.
pub struct ResourceHandle {
    kind: ResourceKind,
    engine: Arc<dyn Engine>,
    native: NativeId,
    state: LifecycleState,
    token: Option<ContextToken>,
    hub: Arc<CallbackHub>,
    torn_down: bool,
}

impl ResourceHandle {
    /// Create a native object.
    ///
    /// On failure nothing is leaked: no token stays registered and a native
    /// object created before a later step failed is disposed.
    pub fn create(engine: Arc<dyn Engine>, args: &CreateArgs<'_>) -> Result<Self> {
        Self::create_with(engine, args, |_| {})
    }

    /// Like [`create`](Self::create), with `prepare` run on the callback
    /// hub before the native object exists. Handlers for callbacks bound
    /// at creation are installed there.
    pub(crate) fn create_with(
        engine: Arc<dyn Engine>,
        args: &CreateArgs<'_>,
        prepare: impl FnOnce(&CallbackHub),
    ) -> Result<Self> {
        let kind = args.kind();
        let hub = Arc::new(CallbackHub::new(kind, Arc::clone(&engine)));
        prepare(&hub);
        let table = thunk::table();

        let mut native = NativeId::NULL;
        let token = if args.binds_user_data() {
            // The engine may call back as soon as the object exists, so the
            // token has to be live before the create call.
            let token = table.register(&hub)?;
            let created = status::check(engine.create(args, token.as_user_data(), &mut native))
                .and_then(|()| non_null(native));
            if let Err(err) = created {
                table.unregister(token);
                if !native.is_null() {
                    engine.dispose(Target::new(kind, native));
                }
                return Err(err);
            }
            token
        } else {
            status::check(engine.create(args, ptr::null_mut(), &mut native))?;
            non_null(native)?;
            match table.register(&hub) {
                Ok(token) => token,
                Err(err) => {
                    engine.dispose(Target::new(kind, native));
                    return Err(err);
                }
            }
        };

        hub.set_native(native);
        log::debug!(
            "created {} {:?} on {} ({:?})",
            kind,
            native,
            engine.name(),
            token
        );

        Ok(Self {
            kind,
            engine,
            native,
            state: LifecycleState::initial(kind),
            token: Some(token),
            hub,
            torn_down: false,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The native identifier, or null after teardown.
    pub fn native_id(&self) -> NativeId {
        self.native
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Handler failures recorded for this resource.
    pub fn diagnostics(&self) -> &CallbackDiagnostics {
        &self.hub.diagnostics
    }

    pub(crate) fn target(&self) -> Target {
        Target::new(self.kind, self.native)
    }

    pub(crate) fn hub(&self) -> &CallbackHub {
        &self.hub
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::Fatal(Reason::InvalidHandle));
        }
        Ok(())
    }

    /// The token as callback user data.
    pub(crate) fn user_data(&self) -> Result<*mut c_void> {
        self.ensure_live()?;
        self.token
            .map(ContextToken::as_user_data)
            .ok_or(Error::Fatal(Reason::InvalidHandle))
    }

    /// Validate `op` against the current state without calling the engine.
    pub(crate) fn check_operation(&self, op: Operation) -> Result<LifecycleState> {
        self.ensure_live()?;
        lifecycle::transition(self.state, op)
    }

    fn apply(
        &mut self,
        op: Operation,
        call: impl FnOnce(&dyn Engine, Target) -> OsStatus,
    ) -> Result<()> {
        let next = self.check_operation(op)?;
        status::check(call(&*self.engine, self.target()))?;
        log::debug!("{} {:?}: {} -> {}", self.kind, self.native, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn open(&mut self) -> Result<()> {
        self.apply(Operation::Open, |engine, target| engine.open(target))
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.apply(Operation::Initialize, |engine, target| {
            engine.initialize(target)
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.apply(Operation::Start, |engine, target| engine.start(target))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.apply(Operation::Stop, |engine, target| engine.stop(target))
    }

    pub fn uninitialize(&mut self) -> Result<()> {
        self.apply(Operation::Uninitialize, |engine, target| {
            engine.uninitialize(target)
        })
    }

    /// Bring the object down to `Closed` from any state, stopping and
    /// uninitializing on the way. Stops at the first native failure.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.wind_down(|_, err| Err(err))
    }

    // Steps down one state at a time; `on_error` decides whether to carry
    // on.
    fn wind_down(
        &mut self,
        mut on_error: impl FnMut(&'static str, Error) -> Result<()>,
    ) -> Result<()> {
        let target = self.target();
        if self.state == LifecycleState::Running {
            if let Err(err) = status::check(self.engine.stop(target)) {
                on_error("stop", err)?;
            }
            self.state = LifecycleState::Initialized;
        }
        if self.state == LifecycleState::Initialized {
            if let Err(err) = status::check(self.engine.uninitialize(target)) {
                on_error("uninitialize", err)?;
            }
            self.state = LifecycleState::Open;
        }
        if self.state == LifecycleState::Open {
            if let Err(err) = status::check(self.engine.close(target)) {
                on_error("close", err)?;
            }
            self.state = LifecycleState::Closed;
        }
        Ok(())
    }

    /// Release everything. Idempotent: later calls make no native calls.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let target = self.target();

        let user_data = self.token.map(ContextToken::as_user_data);
        if let Some(token) = self.token.take() {
            thunk::table().unregister(token);
        }
        if let Some(user_data) = user_data {
            let engine = &self.engine;
            self.hub.listeners.drain(|property_id| {
                status::check(engine.remove_property_listener(
                    target,
                    property_id,
                    thunk::property_thunk,
                    user_data,
                ))
            });
        }

        // Best effort from here on: the object is going away regardless.
        let kind = self.kind;
        if let Err(err) = self.wind_down(|step, err| {
            log::warn!("teardown of {} {:?}: {} failed: {}", kind, target.id, step, err);
            Ok(())
        }) {
            log::warn!("teardown of {} {:?} stopped early: {}", kind, target.id, err);
        }
        if let Err(err) = status::check(self.engine.dispose(target)) {
            log::warn!("dispose of {} {:?} failed: {}", kind, target.id, err);
        }

        self.hub.clear_handlers();
        self.hub.set_native(NativeId::NULL);
        self.native = NativeId::NULL;
        self.state = LifecycleState::Closed;
        log::debug!("tore down {} {:?}", kind, target.id);
    }

    /// Size and writability of a property.
    pub fn property_info(&self, address: PropertyAddress) -> Result<PropertyInfo> {
        self.ensure_live()?;
        let mut size = 0;
        let mut writable = false;
        status::check(
            self.engine
                .property_info(self.target(), address, &mut size, &mut writable),
        )?;
        Ok(PropertyInfo { size, writable })
    }

    /// Read a property into a `T`.
    ///
    /// Fails with `Fatal(InvalidPropertySize)` if the engine reports a size
    /// other than `size_of::<T>()`.
    pub fn get_property<T: PropertyData>(&self, address: PropertyAddress) -> Result<T> {
        self.ensure_live()?;
        let mut value = MaybeUninit::<T>::zeroed();
        let mut size = T::SIZE;
        // SAFETY: `value` is writable for `size` bytes
        let code = unsafe {
            self.engine.get_property(
                self.target(),
                address,
                value.as_mut_ptr().cast::<c_void>(),
                &mut size,
            )
        };
        status::check(code)?;
        if size != T::SIZE {
            return Err(Error::Fatal(Reason::InvalidPropertySize));
        }
        // SAFETY: zero-initialized, and PropertyData admits every bit pattern
        Ok(unsafe { value.assume_init() })
    }

    pub fn set_property<T: PropertyData>(&self, address: PropertyAddress, value: &T) -> Result<()> {
        self.ensure_live()?;
        // SAFETY: `value` is readable for `T::SIZE` bytes
        let code = unsafe {
            self.engine.set_property(
                self.target(),
                address,
                (value as *const T).cast::<c_void>(),
                T::SIZE,
            )
        };
        status::check(code)
    }

    /// Read a property of any size.
    pub fn get_property_bytes(&self, address: PropertyAddress) -> Result<Vec<u8>> {
        let info = self.property_info(address)?;
        let mut data = vec![0u8; info.size as usize];
        let mut size = info.size;
        // SAFETY: `data` is writable for `size` bytes
        let code = unsafe {
            self.engine.get_property(
                self.target(),
                address,
                data.as_mut_ptr().cast::<c_void>(),
                &mut size,
            )
        };
        status::check(code)?;
        data.truncate(size as usize);
        Ok(data)
    }

    pub fn set_property_bytes(&self, address: PropertyAddress, data: &[u8]) -> Result<()> {
        self.ensure_live()?;
        let size = u32::try_from(data.len()).map_err(|_| Error::Fatal(Reason::InvalidPropertySize))?;
        // SAFETY: `data` is readable for `size` bytes
        let code = unsafe {
            self.engine.set_property(
                self.target(),
                address,
                data.as_ptr().cast::<c_void>(),
                size,
            )
        };
        status::check(code)
    }

    /// Subscribe to changes of `property_id`.
    ///
    /// The first subscriber for a property registers the native listener;
    /// later ones share it.
    pub fn subscribe(
        &self,
        property_id: u32,
        listener: impl PropertyListener,
    ) -> Result<SubscriptionId> {
        let user_data = self.user_data()?;
        let target = self.target();
        let engine = &self.engine;
        self.hub
            .listeners
            .subscribe(property_id, Arc::new(listener), || {
                status::check(engine.add_property_listener(
                    target,
                    property_id,
                    thunk::property_thunk,
                    user_data,
                ))
            })
    }

    /// Remove a subscription. The native listener goes with the last
    /// subscriber. Returns `Ok(false)` for unknown subscriptions.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let user_data = self.user_data()?;
        let target = self.target();
        let engine = &self.engine;
        self.hub.listeners.unsubscribe(id, || {
            status::check(engine.remove_property_listener(
                target,
                id.property_id,
                thunk::property_thunk,
                user_data,
            ))
        })
    }

    pub fn subscriber_count(&self, property_id: u32) -> usize {
        self.hub.listeners.subscriber_count(property_id)
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if !self.torn_down {
            log::warn!(
                "{} {:?} dropped without teardown, reclaiming",
                self.kind,
                self.native
            );
            self.teardown();
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind)
            .field("native", &self.native)
            .field("state", &self.state)
            .field("token", &self.token)
            .finish()
    }
}

fn non_null(native: NativeId) -> Result<()> {
    if native.is_null() {
        return Err(Error::Fatal(Reason::InvalidHandle));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::ComponentDescription;
    use crate::listeners::PropertyEvent;
    use crate::property::ids;
    use crate::soft::{SoftCall, SoftEngine};
    use crate::status::codes;

    fn unit(engine: &Arc<SoftEngine>) -> ResourceHandle {
        ResourceHandle::create(
            engine.clone(),
            &CreateArgs::Unit(ComponentDescription::DEFAULT_OUTPUT),
        )
        .unwrap()
    }

    #[test]
    fn test_lifecycle_roundtrip() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        assert_eq!(handle.state(), LifecycleState::Open);

        handle.initialize().unwrap();
        handle.start().unwrap();
        assert!(engine.is_running(handle.native_id()));
        handle.stop().unwrap();
        handle.uninitialize().unwrap();
        assert_eq!(handle.state(), LifecycleState::Open);
        handle.teardown();
    }

    #[test]
    fn test_illegal_transition_skips_engine() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);

        let err = handle.start().unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::InvalidState));
        assert_eq!(engine.call_count(SoftCall::Start), 0);
        assert_eq!(handle.state(), LifecycleState::Open);
    }

    #[test]
    fn test_failed_native_call_keeps_state() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);

        engine.fail_next(SoftCall::Initialize, codes::CANNOT_DO_IN_CURRENT_CONTEXT);
        let err = handle.initialize().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(handle.state(), LifecycleState::Open);

        handle.initialize().unwrap();
        assert_eq!(handle.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle.initialize().unwrap();
        handle.start().unwrap();

        handle.teardown();
        assert!(handle.is_torn_down());
        assert_eq!(handle.state(), LifecycleState::Closed);
        assert!(handle.native_id().is_null());
        assert_eq!(engine.object_count(), 0);

        engine.reset_counts();
        handle.teardown();
        drop(handle);
        assert_eq!(engine.total_calls(), 0);
    }

    #[test]
    fn test_teardown_continues_past_failed_steps() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle.initialize().unwrap();
        handle.start().unwrap();

        engine.fail_next(SoftCall::Stop, codes::CANNOT_DO_IN_CURRENT_CONTEXT);
        engine.fail_next(SoftCall::Uninitialize, codes::UNINITIALIZED);
        handle.teardown();

        assert_eq!(handle.state(), LifecycleState::Closed);
        assert_eq!(engine.call_count(SoftCall::Close), 1);
        assert_eq!(engine.call_count(SoftCall::Dispose), 1);
        assert_eq!(engine.object_count(), 0);
    }

    #[test]
    fn test_torn_down_handle_rejects_operations() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle.teardown();

        assert_eq!(handle.open(), Err(Error::Fatal(Reason::InvalidHandle)));
        assert_eq!(handle.close(), Err(Error::Fatal(Reason::InvalidHandle)));
        assert_eq!(
            handle
                .get_property::<u32>(PropertyAddress::global(ids::MAXIMUM_FRAMES_PER_SLICE))
                .unwrap_err(),
            Error::Fatal(Reason::InvalidHandle)
        );
    }

    #[test]
    fn test_create_failure_leaks_nothing() {
        let engine = Arc::new(SoftEngine::new());
        engine.fail_next(SoftCall::Create, codes::MEM_FULL);

        let err = ResourceHandle::create(engine.clone(), &CreateArgs::Graph).unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::OutOfMemory));
        assert_eq!(engine.object_count(), 0);
        assert_eq!(engine.call_count(SoftCall::Dispose), 0);
    }

    #[test]
    fn test_drop_without_teardown_reclaims() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle.initialize().unwrap();
        handle.start().unwrap();
        drop(handle);

        assert_eq!(engine.object_count(), 0);
        assert_eq!(engine.call_count(SoftCall::Stop), 1);
        assert_eq!(engine.call_count(SoftCall::Dispose), 1);
    }

    #[test]
    fn test_close_from_running() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle.initialize().unwrap();
        handle.start().unwrap();

        handle.close().unwrap();
        assert_eq!(handle.state(), LifecycleState::Closed);
        assert!(!engine.is_running(handle.native_id()));
        assert!(!engine.is_initialized(handle.native_id()));
    }

    #[test]
    fn test_property_size_mismatch() {
        let engine = Arc::new(SoftEngine::new());
        let handle = unit(&engine);
        let address = PropertyAddress::global(ids::MAXIMUM_FRAMES_PER_SLICE);

        assert_eq!(handle.get_property::<u32>(address).unwrap(), 1156);
        assert_eq!(
            handle.get_property::<u64>(address).unwrap_err(),
            Error::Fatal(Reason::InvalidPropertySize)
        );

        let info = handle.property_info(address).unwrap();
        assert_eq!(info, PropertyInfo { size: 4, writable: true });
        assert_eq!(handle.get_property_bytes(address).unwrap(), 1156u32.to_ne_bytes());
    }

    #[test]
    fn test_subscribers_share_one_native_listener() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        let calls = Arc::new(AtomicUsize::new(0));

        let subscriptions: Vec<_> = (0..3)
            .map(|_| {
                let calls = Arc::clone(&calls);
                handle
                    .subscribe(ids::IS_RUNNING, move |event: &PropertyEvent| {
                        assert_eq!(event.property_id, ids::IS_RUNNING);
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();
        assert_eq!(handle.subscriber_count(ids::IS_RUNNING), 3);
        assert_eq!(engine.listener_count(handle.native_id(), ids::IS_RUNNING), 1);

        handle.initialize().unwrap();
        handle.start().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert!(handle.unsubscribe(subscriptions[0]).unwrap());
        assert!(handle.unsubscribe(subscriptions[1]).unwrap());
        assert_eq!(engine.listener_count(handle.native_id(), ids::IS_RUNNING), 1);
        assert!(handle.unsubscribe(subscriptions[2]).unwrap());
        assert_eq!(engine.listener_count(handle.native_id(), ids::IS_RUNNING), 0);
        assert!(!handle.unsubscribe(subscriptions[2]).unwrap());
    }

    #[test]
    fn test_teardown_removes_native_listeners() {
        let engine = Arc::new(SoftEngine::new());
        let mut handle = unit(&engine);
        handle
            .subscribe(ids::STREAM_FORMAT, |_: &PropertyEvent| Ok(()))
            .unwrap();
        handle
            .subscribe(ids::LATENCY, |_: &PropertyEvent| Ok(()))
            .unwrap();

        handle.teardown();
        assert_eq!(engine.call_count(SoftCall::RemovePropertyListener), 2);
        assert_eq!(handle.subscriber_count(ids::STREAM_FORMAT), 0);
    }
}
