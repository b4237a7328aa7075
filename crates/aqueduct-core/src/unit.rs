//! Audio units.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::buffers::OwnedBufferList;
use crate::config::ComponentDescription;
use crate::engine::{AudioTimeStamp, CreateArgs, Engine};
use crate::error::Result;
use crate::format::StreamFormat;
use crate::handle::ResourceHandle;
use crate::property::{ids, PropertyAddress, Scope};
use crate::status;
use crate::thunk::{self, InputHandler, RenderHandler};

/// An audio unit (or plain component instance) and its callbacks.
#[derive(Debug)]
pub struct AudioUnit {
    handle: ResourceHandle,
    description: ComponentDescription,
    render_element: Option<u32>,
}

impl AudioUnit {
    /// Instantiate the component matching `description`.
    pub fn new(engine: Arc<dyn Engine>, description: ComponentDescription) -> Result<Self> {
        let handle = ResourceHandle::create(engine, &CreateArgs::Unit(description))?;
        Ok(Self::from_parts(handle, description))
    }

    /// Instantiate as a generic component instance.
    pub fn component_instance(
        engine: Arc<dyn Engine>,
        description: ComponentDescription,
    ) -> Result<Self> {
        let handle = ResourceHandle::create(engine, &CreateArgs::ComponentInstance(description))?;
        Ok(Self::from_parts(handle, description))
    }

    fn from_parts(handle: ResourceHandle, description: ComponentDescription) -> Self {
        Self {
            handle,
            description,
            render_element: None,
        }
    }

    pub fn description(&self) -> &ComponentDescription {
        &self.description
    }

    /// Feed input element `element` from `handler` on the render thread.
    /// Replaces any handler installed before.
    ///
    /// If the engine refuses the new callback, the previous handler and
    /// element stay in place.
    pub fn set_render_handler(&mut self, element: u32, handler: impl RenderHandler) -> Result<()> {
        let user_data = self.handle.user_data()?;
        let previous_slot = self.handle.hub().set_render_handler(Box::new(handler));
        let code = self.handle.engine().set_render_callback(
            self.handle.target(),
            element,
            Some(thunk::render_thunk),
            user_data,
        );
        if let Err(err) = status::check(code) {
            self.handle.hub().restore_render_slot(previous_slot);
            return Err(err);
        }
        drop(previous_slot);

        let previous_element = self.render_element.replace(element);
        if let Some(previous) = previous_element.filter(|&e| e != element) {
            if let Err(err) = self.clear_native_render_callback(previous) {
                log::warn!(
                    "unit {:?}: render callback left on element {}: {}",
                    self.handle.native_id(),
                    previous,
                    err
                );
            }
        }
        Ok(())
    }

    pub fn clear_render_handler(&mut self) -> Result<()> {
        self.handle.ensure_live()?;
        if let Some(element) = self.render_element {
            self.clear_native_render_callback(element)?;
            self.render_element = None;
        }
        self.handle.hub().clear_render_handler();
        Ok(())
    }

    fn clear_native_render_callback(&self, element: u32) -> Result<()> {
        status::check(self.handle.engine().set_render_callback(
            self.handle.target(),
            element,
            None,
            std::ptr::null_mut(),
        ))
    }

    /// Be told when input is available (I/O units only). Pull the samples
    /// with [`InputContext::pull`](crate::thunk::InputContext::pull).
    pub fn set_input_handler(&mut self, handler: impl InputHandler) -> Result<()> {
        let user_data = self.handle.user_data()?;
        self.handle.hub().set_input_handler(Box::new(handler));
        let code = self.handle.engine().set_input_callback(
            self.handle.target(),
            Some(thunk::input_thunk),
            user_data,
        );
        if let Err(err) = status::check(code) {
            self.handle.hub().clear_input_handler();
            return Err(err);
        }
        Ok(())
    }

    pub fn clear_input_handler(&mut self) -> Result<()> {
        self.handle.ensure_live()?;
        if self.handle.hub().clear_input_handler() {
            status::check(self.handle.engine().set_input_callback(
                self.handle.target(),
                None,
                std::ptr::null_mut(),
            ))?;
        }
        Ok(())
    }

    /// Render `frames` frames of bus `bus` into `buffers`.
    ///
    /// Returns the action flags the engine reported.
    pub fn pull_input(
        &self,
        time_stamp: &AudioTimeStamp,
        bus: u32,
        frames: u32,
        buffers: &mut OwnedBufferList,
    ) -> Result<u32> {
        self.handle.ensure_live()?;
        let mut flags = 0;
        // SAFETY: `buffers` owns a valid record
        let code = unsafe {
            self.handle.engine().render(
                self.handle.target(),
                &mut flags,
                time_stamp,
                bus,
                frames,
                buffers.as_mut_ptr(),
            )
        };
        status::check(code)?;
        Ok(flags)
    }

    pub fn stream_format(&self, scope: Scope, element: u32) -> Result<StreamFormat> {
        self.handle
            .get_property(PropertyAddress::new(ids::STREAM_FORMAT, scope, element))
    }

    pub fn set_stream_format(
        &self,
        scope: Scope,
        element: u32,
        format: &StreamFormat,
    ) -> Result<()> {
        self.handle
            .set_property(PropertyAddress::new(ids::STREAM_FORMAT, scope, element), format)
    }

    pub fn maximum_frames_per_slice(&self) -> Result<u32> {
        self.handle
            .get_property(PropertyAddress::global(ids::MAXIMUM_FRAMES_PER_SLICE))
    }

    pub fn set_maximum_frames_per_slice(&self, frames: u32) -> Result<()> {
        self.handle.set_property(
            PropertyAddress::global(ids::MAXIMUM_FRAMES_PER_SLICE),
            &frames,
        )
    }

    /// Processing latency in seconds.
    pub fn latency(&self) -> Result<f64> {
        self.handle.get_property(PropertyAddress::global(ids::LATENCY))
    }

    pub fn into_handle(self) -> ResourceHandle {
        self.handle
    }
}

impl Deref for AudioUnit {
    type Target = ResourceHandle;

    fn deref(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl DerefMut for AudioUnit {
    fn deref_mut(&mut self) -> &mut ResourceHandle {
        &mut self.handle
    }
}

impl From<AudioUnit> for ResourceHandle {
    fn from(unit: AudioUnit) -> Self {
        unit.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use parking_lot::Mutex;

    use crate::error::{Error, Reason};
    use crate::soft::{SoftCall, SoftEngine};
    use crate::status::{codes, NO_ERR};
    use crate::thunk::{
        ignored_callbacks, CallbackError, CallbackFailure, CallbackKind, CallbackResult,
        InputContext, RenderContext, RENDER_ACTION_OUTPUT_IS_SILENCE,
    };

    fn output_unit(engine: &Arc<SoftEngine>) -> AudioUnit {
        AudioUnit::new(engine.clone(), ComponentDescription::DEFAULT_OUTPUT).unwrap()
    }

    fn fill(context: &mut RenderContext<'_>, value: f32) {
        for index in 0..context.buffer_count() {
            if let Some(samples) = context.channel_mut(index) {
                samples.fill(value);
            }
        }
    }

    #[test]
    fn test_render_handler_fills_buffers() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        unit.set_render_handler(0, |context: &mut RenderContext<'_>| {
            assert_eq!(context.frames(), 16);
            fill(context, 0.5);
            Ok(())
        })
        .unwrap();

        let mut buffers = OwnedBufferList::with_buffers(2, 64).unwrap();
        let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_eq!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
        assert!(buffers.channel(0).unwrap().iter().all(|&s| s == 0.5));
        assert!(buffers.channel(1).unwrap().iter().all(|&s| s == 0.5));
        assert_eq!(unit.diagnostics().failure_count(), 0);
    }

    #[test]
    fn test_shrunk_byte_size_is_written_back() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        unit.set_render_handler(0, |context: &mut RenderContext<'_>| {
            context.set_valid_bytes(0, 32);
            context.set_valid_bytes(1, 1024);
            Ok(())
        })
        .unwrap();

        let mut buffers = OwnedBufferList::with_buffers(2, 64).unwrap();
        engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(buffers.get(0).unwrap().byte_size, 32);
        assert_eq!(buffers.get(1).unwrap().byte_size, 64);
    }

    #[test]
    fn test_render_error_outputs_silence() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        unit.set_render_handler(0, |context: &mut RenderContext<'_>| {
            fill(context, 1.0);
            Err(CallbackError::new(-1))
        })
        .unwrap();

        let mut buffers = OwnedBufferList::with_buffers(2, 64).unwrap();
        let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_ne!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
        assert!(buffers.channel(0).unwrap().iter().all(|&s| s == 0.0));
        assert_eq!(
            unit.diagnostics().last_failure(),
            Some(CallbackFailure::error(CallbackKind::Render, -1))
        );
    }

    #[test]
    fn test_render_panic_is_contained() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        unit.set_render_handler(0, |_: &mut RenderContext<'_>| -> CallbackResult {
            panic!("render handler blew up")
        })
        .unwrap();

        let mut buffers = OwnedBufferList::with_buffers(1, 64).unwrap();
        buffers.channel_mut(0).unwrap().fill(1.0);
        let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_ne!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
        assert!(buffers.channel(0).unwrap().iter().all(|&s| s == 0.0));
        assert_eq!(
            unit.diagnostics().last_failure(),
            Some(CallbackFailure::panic(CallbackKind::Render))
        );

        // The unit keeps rendering afterwards.
        let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_eq!(unit.diagnostics().failure_count(), 2);
    }

    #[test]
    fn test_moving_render_element() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let id = unit.native_id();

        unit.set_render_handler(0, |_: &mut RenderContext<'_>| Ok(()))
            .unwrap();
        unit.set_render_handler(1, |_: &mut RenderContext<'_>| Ok(()))
            .unwrap();
        assert!(!engine.has_render_callback(id, 0));
        assert!(engine.has_render_callback(id, 1));

        unit.clear_render_handler().unwrap();
        assert!(!engine.has_render_callback(id, 1));
    }

    #[test]
    fn test_failed_render_registration_rolls_back() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        engine.fail_next(SoftCall::SetRenderCallback, codes::INVALID_ELEMENT);

        let err = unit
            .set_render_handler(7, |_: &mut RenderContext<'_>| Ok(()))
            .unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::InvalidElement));
        assert!(!engine.has_render_callback(unit.native_id(), 7));

        // Nothing left behind to clear.
        engine.reset_counts();
        unit.clear_render_handler().unwrap();
        assert_eq!(engine.call_count(SoftCall::SetRenderCallback), 0);
    }

    fn counting_handler(calls: &Arc<AtomicUsize>) -> impl RenderHandler {
        let counter = Arc::clone(calls);
        move |_: &mut RenderContext<'_>| -> CallbackResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failed_replacement_keeps_previous_handler() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let id = unit.native_id();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        unit.set_render_handler(0, counting_handler(&first)).unwrap();

        engine.fail_next(SoftCall::SetRenderCallback, codes::CANNOT_DO_IN_CURRENT_CONTEXT);
        let err = unit
            .set_render_handler(0, counting_handler(&second))
            .unwrap_err();
        assert_eq!(err, Error::Recoverable(Reason::CannotDoInCurrentContext));

        let mut buffers = OwnedBufferList::with_buffers(1, 64).unwrap();
        let report = engine.render_cycle(id, 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_eq!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        // Still tracked on element 0.
        engine.reset_counts();
        unit.clear_render_handler().unwrap();
        assert_eq!(engine.call_count(SoftCall::SetRenderCallback), 1);
        assert!(!engine.has_render_callback(id, 0));
    }

    #[test]
    fn test_failed_move_keeps_previous_element() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let id = unit.native_id();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        unit.set_render_handler(0, counting_handler(&first)).unwrap();

        engine.fail_next(SoftCall::SetRenderCallback, codes::INVALID_ELEMENT);
        assert!(unit.set_render_handler(3, counting_handler(&second)).is_err());
        assert!(engine.has_render_callback(id, 0));
        assert!(!engine.has_render_callback(id, 3));

        let mut buffers = OwnedBufferList::with_buffers(1, 64).unwrap();
        engine.render_cycle(id, 0, 16, &mut buffers);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_render_list_up_to_max_buffers() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        unit.set_render_handler(0, move |context: &mut RenderContext<'_>| {
            sink.store(context.buffer_count(), Ordering::SeqCst);
            fill(context, 0.5);
            Ok(())
        })
        .unwrap();

        let max = crate::config::config().max_buffers;
        for count in [20, max] {
            let mut buffers = OwnedBufferList::with_buffers(count, 64).unwrap();
            let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
            assert_eq!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
            assert_eq!(seen.load(Ordering::SeqCst), count);
            assert!(buffers.channel(count - 1).unwrap().iter().all(|&s| s == 0.5));
        }
        assert_eq!(unit.diagnostics().failure_count(), 0);
    }

    #[test]
    fn test_oversized_list_is_zeroed() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let calls = Arc::new(AtomicUsize::new(0));
        unit.set_render_handler(0, counting_handler(&calls)).unwrap();

        let max = crate::config::config().max_buffers;
        let mut buffers = OwnedBufferList::with_buffers(max + 1, 64).unwrap();
        for index in 0..=max {
            buffers.channel_mut(index).unwrap().fill(1.0);
        }
        let report = engine.render_cycle(unit.native_id(), 0, 16, &mut buffers);
        assert_eq!(report.status, NO_ERR);
        assert_ne!(report.action_flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        for index in 0..max {
            assert!(buffers.channel(index).unwrap().iter().all(|&s| s == 0.0));
        }
        assert_eq!(
            unit.diagnostics().last_failure(),
            Some(CallbackFailure::error(CallbackKind::Render, codes::PARAM_ERR))
        );
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        unit.set_render_handler(0, move |_: &mut RenderContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        let user_data = unit.user_data().unwrap();
        unit.teardown();

        let before = ignored_callbacks();
        let mut buffers = OwnedBufferList::with_buffers(1, 64).unwrap();
        let mut flags = 0;
        let time_stamp = AudioTimeStamp::with_sample_time(0.0);
        // SAFETY: valid arguments; the token is simply no longer registered
        let code = unsafe {
            thunk::render_thunk(
                user_data,
                &mut flags,
                &time_stamp,
                0,
                16,
                buffers.as_mut_ptr(),
            )
        };
        assert_eq!(code, NO_ERR);
        assert!(ignored_callbacks() > before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_input_handler_pulls_samples() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = output_unit(&engine);
        engine.set_input_level(unit.native_id(), Some(0.25));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut buffers = OwnedBufferList::with_buffers(2, 64).unwrap();
        unit.set_input_handler(move |context: &mut InputContext<'_>| -> CallbackResult {
            assert_eq!(context.bus(), 1);
            context.pull(&mut buffers)?;
            *sink.lock() = buffers.channel(1).map(|samples| samples[0]);
            Ok(())
        })
        .unwrap();

        assert_eq!(engine.fire_input(unit.native_id(), 1, 16), NO_ERR);
        assert_eq!(*seen.lock(), Some(0.25));

        unit.clear_input_handler().unwrap();
        *seen.lock() = None;
        assert_eq!(engine.fire_input(unit.native_id(), 1, 16), NO_ERR);
        assert_eq!(*seen.lock(), None);
    }

    #[test]
    fn test_pull_input() {
        let engine = Arc::new(SoftEngine::new());
        let unit = output_unit(&engine);
        let mut buffers = OwnedBufferList::with_buffers(2, 64).unwrap();
        let time_stamp = AudioTimeStamp::with_sample_time(0.0);

        let flags = unit.pull_input(&time_stamp, 1, 16, &mut buffers).unwrap();
        assert_ne!(flags & RENDER_ACTION_OUTPUT_IS_SILENCE, 0);

        let err = unit
            .pull_input(&time_stamp, 1, 4096, &mut buffers)
            .unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::TooManyFramesToProcess));
    }

    #[test]
    fn test_unit_properties() {
        let engine = Arc::new(SoftEngine::new());
        let unit = output_unit(&engine);

        assert_eq!(
            unit.stream_format(Scope::Output, 0).unwrap(),
            StreamFormat::float32_non_interleaved(44_100.0, 2)
        );
        let mono = StreamFormat::float32_non_interleaved(48_000.0, 1);
        unit.set_stream_format(Scope::Input, 0, &mono).unwrap();
        assert_eq!(unit.stream_format(Scope::Input, 0).unwrap(), mono);

        unit.set_maximum_frames_per_slice(512).unwrap();
        assert_eq!(unit.maximum_frames_per_slice().unwrap(), 512);
        assert_eq!(unit.latency().unwrap(), 0.0);
        assert_eq!(
            unit.set_property(PropertyAddress::global(ids::LATENCY), &1.0f64),
            Err(Error::Fatal(Reason::PropertyNotWritable))
        );
    }

    #[test]
    fn test_unknown_component_type() {
        let engine = Arc::new(SoftEngine::new());
        let mut description = ComponentDescription::DEFAULT_OUTPUT;
        description.component_type = 0;
        let err = AudioUnit::new(engine.clone(), description).unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::InvalidParameter));
        assert_eq!(engine.object_count(), 0);
    }

    #[test]
    fn test_teardown_races_render_thread() {
        let engine = Arc::new(SoftEngine::new());

        for _ in 0..32 {
            let mut unit = output_unit(&engine);
            let renders = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&renders);
            unit.set_render_handler(0, move |context: &mut RenderContext<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                fill(context, 1.0);
                Ok(())
            })
            .unwrap();

            let id = unit.native_id();
            let stop = Arc::new(AtomicBool::new(false));
            let render_thread = {
                let engine = Arc::clone(&engine);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut buffers = OwnedBufferList::with_buffers(2, 256).unwrap();
                    while !stop.load(Ordering::SeqCst) {
                        let report = engine.render_cycle(id, 0, 64, &mut buffers);
                        if report.status != NO_ERR {
                            assert_eq!(report.status, codes::HARDWARE_BAD_OBJECT);
                            break;
                        }
                    }
                })
            };

            while renders.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            unit.teardown();
            let after_teardown = renders.load(Ordering::SeqCst);
            stop.store(true, Ordering::SeqCst);
            render_thread.join().unwrap();

            assert_eq!(renders.load(Ordering::SeqCst), after_teardown);
        }
        assert_eq!(engine.object_count(), 0);
    }
}
