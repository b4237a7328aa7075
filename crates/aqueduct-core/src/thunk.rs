//! Callback thunks.
//!
//! One `extern "C"` function per callback kind, living for the whole
//! process. Each is registered with the engine together with the
//! resource's [`ContextToken`] as user data. On invocation a thunk resolves
//! the token; a miss means the resource is already torn down and the call
//! is absorbed with `noErr`. A hit forwards to the handler installed on the
//! resource's [`CallbackHub`].
//!
//! Handler errors and panics never cross back into the engine. They are
//! recorded in the resource's [`CallbackDiagnostics`] instead.
//!
//! The render and input paths do not allocate, do not block and do not log:
//! handler slots are taken with `try_lock` (a miss renders silence) and
//! buffer lists are decoded into scratch sized when the handler was
//! installed.

use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use aqueduct_utils::CodeDisplay;
use parking_lot::Mutex;

use crate::buffers::{self, AudioBufferList, BufferDescriptor, BufferScratch, OwnedBufferList};
use crate::config::config;
use crate::context::{ContextTable, ContextToken};
use crate::engine::{AudioQueueBuffer, AudioTimeStamp, Engine, NativeId, ResourceKind, Target};
use crate::error::{code, Result};
use crate::listeners::{ListenerMultiplexer, PropertyEvent};
use crate::queue::{BufferPool, QueueBuffer};
use crate::status::{self, OsStatus, NO_ERR};

pub const RENDER_ACTION_PRE_RENDER: u32 = 1 << 2;
pub const RENDER_ACTION_POST_RENDER: u32 = 1 << 3;
pub const RENDER_ACTION_OUTPUT_IS_SILENCE: u32 = 1 << 4;

static ZERO_TIME: AudioTimeStamp = AudioTimeStamp::with_sample_time(0.0);

/// Error a handler returns to report failure. Carries the native status
/// that describes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("callback failed with status {}", code(.0))]
pub struct CallbackError(OsStatus);

impl CallbackError {
    pub const fn new(status: OsStatus) -> Self {
        Self(status)
    }

    pub const fn status(&self) -> OsStatus {
        self.0
    }
}

/// Bridge errors have no single native status and are reported as
/// unspecified (`'what'`).
impl From<crate::error::Error> for CallbackError {
    fn from(_: crate::error::Error) -> Self {
        Self(status::codes::HARDWARE_UNSPECIFIED)
    }
}

pub type CallbackResult = std::result::Result<(), CallbackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Render,
    Input,
    PropertyChanged,
    OutputCompleted,
}

impl CallbackKind {
    const ALL: [Self; 4] = [
        Self::Render,
        Self::Input,
        Self::PropertyChanged,
        Self::OutputCompleted,
    ];

    const fn index(self) -> u64 {
        match self {
            Self::Render => 0,
            Self::Input => 1,
            Self::PropertyChanged => 2,
            Self::OutputCompleted => 3,
        }
    }
}

/// One handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackFailure {
    pub kind: CallbackKind,
    /// Status reported by the handler; 0 for panics.
    pub status: OsStatus,
    pub panicked: bool,
}

impl CallbackFailure {
    pub const fn error(kind: CallbackKind, status: OsStatus) -> Self {
        Self {
            kind,
            status,
            panicked: false,
        }
    }

    pub const fn panic(kind: CallbackKind) -> Self {
        Self {
            kind,
            status: 0,
            panicked: true,
        }
    }

    // [status:32][kind:8][panicked:1], plus bit 63 so that 0 means "none".
    const PRESENT: u64 = 1 << 63;

    const fn pack(self) -> u64 {
        Self::PRESENT
            | (self.status as u32 as u64)
            | (self.kind.index() << 32)
            | ((self.panicked as u64) << 40)
    }

    fn unpack(bits: u64) -> Option<Self> {
        if bits & Self::PRESENT == 0 {
            return None;
        }
        let kind = CallbackKind::ALL[((bits >> 32) & 0xff) as usize % CallbackKind::ALL.len()];
        Some(Self {
            kind,
            status: bits as u32 as i32,
            panicked: (bits >> 40) & 1 == 1,
        })
    }
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "{:?} handler panicked", self.kind)
        } else {
            write!(f, "{:?} handler returned {}", self.kind, CodeDisplay(self.status))
        }
    }
}

// Callbacks that arrived for a resource that was already torn down.
static IGNORED_CALLBACKS: AtomicU64 = AtomicU64::new(0);

/// Process-wide count of callbacks absorbed after teardown.
pub fn ignored_callbacks() -> u64 {
    IGNORED_CALLBACKS.load(Ordering::Relaxed)
}

/// Lock-free record of handler failures for one resource.
#[derive(Debug, Default)]
pub struct CallbackDiagnostics {
    last: AtomicU64,
    failures: AtomicU64,
}

impl CallbackDiagnostics {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn record(&self, failure: CallbackFailure) {
        self.last.store(failure.pack(), Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_failure(&self) -> Option<CallbackFailure> {
        CallbackFailure::unpack(self.last.load(Ordering::Relaxed))
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Same as [`ignored_callbacks`]; ignored callbacks have no owner to
    /// be counted against.
    pub fn ignored_count(&self) -> u64 {
        ignored_callbacks()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Fills output buffers on the render thread.
pub trait RenderHandler: Send + 'static {
    fn render(&mut self, context: &mut RenderContext<'_>) -> CallbackResult;
}

impl<F> RenderHandler for F
where
    F: FnMut(&mut RenderContext<'_>) -> CallbackResult + Send + 'static,
{
    fn render(&mut self, context: &mut RenderContext<'_>) -> CallbackResult {
        self(context)
    }
}

/// Notified when input is available on an I/O unit.
pub trait InputHandler: Send + 'static {
    fn input(&mut self, context: &mut InputContext<'_>) -> CallbackResult;
}

impl<F> InputHandler for F
where
    F: FnMut(&mut InputContext<'_>) -> CallbackResult + Send + 'static,
{
    fn input(&mut self, context: &mut InputContext<'_>) -> CallbackResult {
        self(context)
    }
}

/// Refills an output queue buffer the engine finished playing.
pub trait OutputCompletedHandler: Send + 'static {
    fn buffer_completed(&mut self, context: &mut OutputContext<'_>) -> CallbackResult;
}

impl<F> OutputCompletedHandler for F
where
    F: FnMut(&mut OutputContext<'_>) -> CallbackResult + Send + 'static,
{
    fn buffer_completed(&mut self, context: &mut OutputContext<'_>) -> CallbackResult {
        self(context)
    }
}

/// Arguments of one render callback.
pub struct RenderContext<'a> {
    action_flags: &'a mut u32,
    time_stamp: &'a AudioTimeStamp,
    bus: u32,
    frames: u32,
    buffers: &'a mut [BufferDescriptor],
}

impl RenderContext<'_> {
    pub fn action_flags(&self) -> u32 {
        *self.action_flags
    }

    pub fn time_stamp(&self) -> &AudioTimeStamp {
        self.time_stamp
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn buffers(&self) -> &[BufferDescriptor] {
        self.buffers
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Samples of buffer `index`, or `None` if it is not a valid `f32`
    /// buffer.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let descriptor = self.buffers.get(index)?;
        // SAFETY: the engine guarantees the buffers for the duration of the
        // callback, which outlives this borrow of `self`.
        unsafe { descriptor.as_f32_mut() }
    }

    /// Report that fewer bytes than the buffer holds are valid.
    /// Sizes can only shrink.
    pub fn set_valid_bytes(&mut self, index: usize, bytes: u32) {
        if let Some(descriptor) = self.buffers.get_mut(index) {
            descriptor.byte_size = descriptor.byte_size.min(bytes);
        }
    }

    /// Tell the engine the output is silent.
    pub fn mark_silent(&mut self) {
        *self.action_flags |= RENDER_ACTION_OUTPUT_IS_SILENCE;
    }
}

/// Arguments of one input-available callback.
pub struct InputContext<'a> {
    engine: &'a dyn Engine,
    unit: Target,
    action_flags: &'a mut u32,
    time_stamp: &'a AudioTimeStamp,
    bus: u32,
    frames: u32,
}

impl InputContext<'_> {
    pub fn time_stamp(&self) -> &AudioTimeStamp {
        self.time_stamp
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Render the available input into `buffers`.
    ///
    /// Does not allocate; `buffers` must already be sized for
    /// [`frames`](Self::frames).
    pub fn pull(&mut self, buffers: &mut OwnedBufferList) -> Result<()> {
        // SAFETY: `buffers` owns a valid record for the duration of the call
        let code = unsafe {
            self.engine.render(
                self.unit,
                &mut *self.action_flags,
                self.time_stamp,
                self.bus,
                self.frames,
                buffers.as_mut_ptr(),
            )
        };
        status::translate(code).into_result()
    }
}

/// Arguments of one output-completed callback.
pub struct OutputContext<'a> {
    engine: &'a dyn Engine,
    queue: NativeId,
    pool: &'a Mutex<BufferPool>,
    buffer: *mut AudioQueueBuffer,
}

impl OutputContext<'_> {
    pub fn buffer(&self) -> QueueBuffer {
        QueueBuffer::from_ptr(self.buffer)
    }

    pub fn capacity(&self) -> u32 {
        // SAFETY: the engine hands us a live buffer
        unsafe { (*self.buffer).audio_data_bytes_capacity }
    }

    /// The whole buffer, for refilling.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: the buffer is not enqueued while its completion runs
        unsafe {
            let buffer = &mut *self.buffer;
            if buffer.audio_data.is_null() {
                return &mut [];
            }
            std::slice::from_raw_parts_mut(
                buffer.audio_data.cast::<u8>(),
                buffer.audio_data_bytes_capacity as usize,
            )
        }
    }

    /// Enqueue the first `bytes` bytes of the buffer again.
    pub fn enqueue(&mut self, bytes: u32) -> Result<()> {
        // SAFETY: as above
        unsafe {
            let buffer = &mut *self.buffer;
            buffer.audio_data_byte_size = bytes.min(buffer.audio_data_bytes_capacity);
        }
        self.pool.lock().set_in_flight(self.buffer(), true);
        let code = self.engine.enqueue_buffer(self.queue, self.buffer);
        if code != NO_ERR {
            self.pool.lock().set_in_flight(self.buffer(), false);
        }
        status::translate(code).into_result()
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

pub(crate) struct RenderSlot {
    handler: Box<dyn RenderHandler>,
    scratch: BufferScratch,
}

/// Callback state of one resource; the owner that context tokens resolve
/// to.
pub struct CallbackHub {
    kind: ResourceKind,
    engine: Arc<dyn Engine>,
    native: AtomicUsize,
    render: Mutex<Option<RenderSlot>>,
    input: Mutex<Option<Box<dyn InputHandler>>>,
    output: Mutex<Option<Box<dyn OutputCompletedHandler>>>,
    pub(crate) pool: Mutex<BufferPool>,
    pub(crate) listeners: ListenerMultiplexer,
    pub(crate) diagnostics: CallbackDiagnostics,
}

impl CallbackHub {
    pub(crate) fn new(kind: ResourceKind, engine: Arc<dyn Engine>) -> Self {
        Self {
            kind,
            engine,
            native: AtomicUsize::new(0),
            render: Mutex::new(None),
            input: Mutex::new(None),
            output: Mutex::new(None),
            pool: Mutex::new(BufferPool::default()),
            listeners: ListenerMultiplexer::new(),
            diagnostics: CallbackDiagnostics::new(),
        }
    }

    pub(crate) fn set_native(&self, id: NativeId) {
        self.native.store(id.as_raw(), Ordering::Release);
    }

    fn target(&self) -> Target {
        Target::new(
            self.kind,
            NativeId::from_raw(self.native.load(Ordering::Acquire)),
        )
    }

    /// Install `handler`, returning the slot it replaced.
    pub(crate) fn set_render_handler(&self, handler: Box<dyn RenderHandler>) -> Option<RenderSlot> {
        let scratch = BufferScratch::with_capacity(config().max_buffers);
        self.render.lock().replace(RenderSlot { handler, scratch })
    }

    /// Put back a slot returned by [`set_render_handler`](Self::set_render_handler).
    pub(crate) fn restore_render_slot(&self, previous: Option<RenderSlot>) {
        *self.render.lock() = previous;
    }

    pub(crate) fn set_input_handler(&self, handler: Box<dyn InputHandler>) {
        *self.input.lock() = Some(handler);
    }

    pub(crate) fn set_output_handler(&self, handler: Box<dyn OutputCompletedHandler>) {
        *self.output.lock() = Some(handler);
    }

    pub(crate) fn clear_render_handler(&self) -> bool {
        self.render.lock().take().is_some()
    }

    pub(crate) fn clear_input_handler(&self) -> bool {
        self.input.lock().take().is_some()
    }

    /// Drop every handler. Runs after the token is gone, so no callback
    /// can hold the slots.
    pub(crate) fn clear_handlers(&self) {
        self.clear_render_handler();
        self.clear_input_handler();
        self.output.lock().take();
    }

    unsafe fn on_render(
        &self,
        action_flags: *mut u32,
        time_stamp: *const AudioTimeStamp,
        bus: u32,
        frames: u32,
        io_data: *mut AudioBufferList,
    ) -> OsStatus {
        let Some(mut guard) = self.render.try_lock() else {
            silence(action_flags, io_data);
            return NO_ERR;
        };
        let Some(slot) = guard.as_mut() else {
            silence(action_flags, io_data);
            return NO_ERR;
        };
        if buffers::decode_into(io_data, &mut slot.scratch).is_err() {
            self.diagnostics.record(CallbackFailure::error(
                CallbackKind::Render,
                status::codes::PARAM_ERR,
            ));
            silence(action_flags, io_data);
            return NO_ERR;
        }

        let mut flags = if action_flags.is_null() { 0 } else { *action_flags };
        let time_stamp = time_stamp.as_ref().unwrap_or(&ZERO_TIME);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut context = RenderContext {
                action_flags: &mut flags,
                time_stamp,
                bus,
                frames,
                buffers: slot.scratch.as_mut_slice(),
            };
            slot.handler.render(&mut context)
        }));

        match result {
            Ok(Ok(())) => buffers::write_back(io_data, &slot.scratch),
            Ok(Err(err)) => {
                self.diagnostics
                    .record(CallbackFailure::error(CallbackKind::Render, err.status()));
                flags |= RENDER_ACTION_OUTPUT_IS_SILENCE;
                zero_buffers(io_data, &mut slot.scratch);
            }
            Err(_) => {
                self.diagnostics
                    .record(CallbackFailure::panic(CallbackKind::Render));
                flags |= RENDER_ACTION_OUTPUT_IS_SILENCE;
                zero_buffers(io_data, &mut slot.scratch);
            }
        }
        if !action_flags.is_null() {
            *action_flags = flags;
        }
        NO_ERR
    }

    unsafe fn on_input(
        &self,
        action_flags: *mut u32,
        time_stamp: *const AudioTimeStamp,
        bus: u32,
        frames: u32,
    ) -> OsStatus {
        let Some(mut guard) = self.input.try_lock() else {
            return NO_ERR;
        };
        let Some(handler) = guard.as_mut() else {
            return NO_ERR;
        };

        let mut flags = if action_flags.is_null() { 0 } else { *action_flags };
        let time_stamp = time_stamp.as_ref().unwrap_or(&ZERO_TIME);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut context = InputContext {
                engine: &*self.engine,
                unit: self.target(),
                action_flags: &mut flags,
                time_stamp,
                bus,
                frames,
            };
            handler.input(&mut context)
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self
                .diagnostics
                .record(CallbackFailure::error(CallbackKind::Input, err.status())),
            Err(_) => self
                .diagnostics
                .record(CallbackFailure::panic(CallbackKind::Input)),
        }
        NO_ERR
    }

    fn on_property_changed(&self, event: &PropertyEvent) {
        self.listeners.dispatch(event, &self.diagnostics);
    }

    fn on_output_completed(&self, buffer: *mut AudioQueueBuffer) {
        if buffer.is_null() {
            return;
        }
        self.pool
            .lock()
            .set_in_flight(QueueBuffer::from_ptr(buffer), false);

        // Held by an outer completion of this queue on this thread.
        let Some(mut guard) = self.output.try_lock() else {
            self.diagnostics.record(CallbackFailure::error(
                CallbackKind::OutputCompleted,
                status::codes::CANNOT_DO_IN_CURRENT_CONTEXT,
            ));
            return;
        };
        let Some(handler) = guard.as_mut() else {
            return;
        };
        let target = self.target();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut context = OutputContext {
                engine: &*self.engine,
                queue: target.id,
                pool: &self.pool,
                buffer,
            };
            handler.buffer_completed(&mut context)
        }));
        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(err)) => CallbackFailure::error(CallbackKind::OutputCompleted, err.status()),
            Err(_) => CallbackFailure::panic(CallbackKind::OutputCompleted),
        };
        self.diagnostics.record(failure);
        log::error!("output queue {:?}: {}", target.id, failure);
    }
}

impl fmt::Debug for CallbackHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHub")
            .field("kind", &self.kind)
            .field("native", &self.target().id)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

unsafe fn set_flag(action_flags: *mut u32, flag: u32) {
    if !action_flags.is_null() {
        *action_flags |= flag;
    }
}

unsafe fn silence(action_flags: *mut u32, io_data: *mut AudioBufferList) {
    set_flag(action_flags, RENDER_ACTION_OUTPUT_IS_SILENCE);
    // No usable scratch; zero in place, at most `max_buffers` headers.
    if io_data.is_null() {
        return;
    }
    let count = std::ptr::addr_of!((*io_data).number_buffers).read() as usize;
    let first = std::ptr::addr_of_mut!((*io_data).buffers).cast::<BufferDescriptor>();
    for index in 0..count.min(config().max_buffers) {
        first.add(index).read_unaligned().zero();
    }
}

unsafe fn zero_buffers(io_data: *mut AudioBufferList, scratch: &mut BufferScratch) {
    // Re-decode: the handler may have shrunk sizes in the scratch copy.
    if buffers::decode_into(io_data, scratch).is_ok() {
        for descriptor in scratch.as_slice() {
            descriptor.zero();
        }
    }
}

// ---------------------------------------------------------------------------
// Thunks
// ---------------------------------------------------------------------------

static TABLE: OnceLock<ContextTable<CallbackHub>> = OnceLock::new();

/// The process-wide token table, sized by the installed configuration.
pub(crate) fn table() -> &'static ContextTable<CallbackHub> {
    TABLE.get_or_init(|| ContextTable::with_capacity(config().token_capacity))
}

fn dispatch(user_data: *mut c_void, f: impl FnOnce(&CallbackHub) -> OsStatus) -> OsStatus {
    let token = ContextToken::from_user_data(user_data);
    let result = panic::catch_unwind(AssertUnwindSafe(|| table().dispatch(token, f)));
    match result {
        Ok(Some(code)) => code,
        Ok(None) => {
            IGNORED_CALLBACKS.fetch_add(1, Ordering::Relaxed);
            NO_ERR
        }
        Err(_) => NO_ERR,
    }
}

/// Render callback installed on units.
pub(crate) unsafe extern "C" fn render_thunk(
    ref_con: *mut c_void,
    action_flags: *mut u32,
    time_stamp: *const AudioTimeStamp,
    bus_number: u32,
    number_frames: u32,
    io_data: *mut AudioBufferList,
) -> OsStatus {
    dispatch(ref_con, |hub| {
        hub.on_render(action_flags, time_stamp, bus_number, number_frames, io_data)
    })
}

/// Input-available callback installed on I/O units.
pub(crate) unsafe extern "C" fn input_thunk(
    ref_con: *mut c_void,
    action_flags: *mut u32,
    time_stamp: *const AudioTimeStamp,
    bus_number: u32,
    number_frames: u32,
    _io_data: *mut AudioBufferList,
) -> OsStatus {
    dispatch(ref_con, |hub| {
        hub.on_input(action_flags, time_stamp, bus_number, number_frames)
    })
}

/// Property listener installed once per `(resource, property)`.
pub(crate) unsafe extern "C" fn property_thunk(
    ref_con: *mut c_void,
    _unit: *mut c_void,
    property_id: u32,
    scope: u32,
    element: u32,
) {
    let event = PropertyEvent {
        property_id,
        scope,
        element,
    };
    dispatch(ref_con, |hub| {
        hub.on_property_changed(&event);
        NO_ERR
    });
}

/// Completion callback bound to output queues at creation.
pub(crate) unsafe extern "C" fn output_completed_thunk(
    user_data: *mut c_void,
    _queue: *mut c_void,
    buffer: *mut AudioQueueBuffer,
) {
    dispatch(user_data, |hub| {
        hub.on_output_completed(buffer);
        NO_ERR
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_pack_roundtrip() {
        let failure = CallbackFailure::error(CallbackKind::Input, -10863);
        assert_eq!(CallbackFailure::unpack(failure.pack()), Some(failure));
        let panic = CallbackFailure::panic(CallbackKind::OutputCompleted);
        assert_eq!(CallbackFailure::unpack(panic.pack()), Some(panic));
        assert_eq!(CallbackFailure::unpack(0), None);
    }

    #[test]
    fn test_diagnostics_record() {
        let diagnostics = CallbackDiagnostics::new();
        assert!(diagnostics.last_failure().is_none());
        diagnostics.record(CallbackFailure::error(CallbackKind::Render, -50));
        diagnostics.record(CallbackFailure::error(CallbackKind::Render, -4));
        assert_eq!(diagnostics.failure_count(), 2);
        assert_eq!(diagnostics.last_failure().unwrap().status, -4);
    }

    #[test]
    fn test_unknown_token_is_absorbed() {
        let before = ignored_callbacks();
        let mut flags = 0u32;
        let code = unsafe {
            render_thunk(
                ContextToken::from_raw(usize::MAX).as_user_data(),
                &mut flags,
                std::ptr::null(),
                0,
                64,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(code, NO_ERR);
        assert!(ignored_callbacks() > before);
    }

    #[test]
    fn test_render_context_shrinks_only() {
        let mut flags = 0;
        let mut descriptors = [BufferDescriptor::new(1, 64, std::ptr::null_mut())];
        let mut context = RenderContext {
            action_flags: &mut flags,
            time_stamp: &ZERO_TIME,
            bus: 0,
            frames: 16,
            buffers: &mut descriptors,
        };
        context.set_valid_bytes(0, 128);
        assert_eq!(context.buffers()[0].byte_size, 64);
        context.set_valid_bytes(0, 32);
        assert_eq!(context.buffers()[0].byte_size, 32);
        context.mark_silent();
        assert_eq!(flags & RENDER_ACTION_OUTPUT_IS_SILENCE, RENDER_ACTION_OUTPUT_IS_SILENCE);
    }

    #[test]
    fn test_callback_error_display() {
        assert_eq!(
            CallbackError::new(-50).to_string(),
            "callback failed with status -50"
        );
    }
}
