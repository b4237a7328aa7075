//! Output audio queues.
//!
//! A queue plays buffers the caller fills and enqueues. When the engine is
//! done with a buffer it calls the completion handler, which usually
//! refills and re-enqueues it. Buffers belong to the queue and are freed
//! natively when it is disposed.

use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::Arc;

use crate::engine::{AudioQueueBuffer, CreateArgs, Engine};
use crate::error::{Error, Reason, Result};
use crate::format::StreamFormat;
use crate::handle::ResourceHandle;
use crate::property::{ids, PropertyAddress};
use crate::status;
use crate::thunk::{self, OutputCompletedHandler};

/// A buffer allocated by a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueBuffer(usize);

impl QueueBuffer {
    pub(crate) fn from_ptr(ptr: *mut AudioQueueBuffer) -> Self {
        Self(ptr as usize)
    }

    pub(crate) fn as_ptr(self) -> *mut AudioQueueBuffer {
        self.0 as *mut AudioQueueBuffer
    }
}

#[derive(Debug, Clone, Copy)]
struct PoolEntry {
    buffer: QueueBuffer,
    capacity: u32,
    in_flight: bool,
}

/// Buffers a queue has allocated and whether the engine holds them.
#[derive(Debug, Default)]
pub(crate) struct BufferPool {
    entries: Vec<PoolEntry>,
}

impl BufferPool {
    fn insert(&mut self, buffer: QueueBuffer, capacity: u32) {
        self.entries.push(PoolEntry {
            buffer,
            capacity,
            in_flight: false,
        });
    }

    fn entry(&self, buffer: QueueBuffer) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.buffer == buffer)
    }

    fn remove(&mut self, buffer: QueueBuffer) {
        self.entries.retain(|e| e.buffer != buffer);
    }

    pub(crate) fn set_in_flight(&mut self, buffer: QueueBuffer, in_flight: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.buffer == buffer) {
            entry.in_flight = in_flight;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// An output audio queue.
#[derive(Debug)]
pub struct AudioQueue {
    handle: ResourceHandle,
    format: StreamFormat,
}

impl AudioQueue {
    /// Create an output queue. `handler` receives every completed buffer.
    pub fn new_output(
        engine: Arc<dyn Engine>,
        format: StreamFormat,
        handler: impl OutputCompletedHandler,
    ) -> Result<Self> {
        let args = CreateArgs::OutputQueue {
            format,
            callback: thunk::output_completed_thunk,
        };
        let handle = ResourceHandle::create_with(engine, &args, |hub| {
            hub.set_output_handler(Box::new(handler));
        })?;
        Ok(Self { handle, format })
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Whether the engine reports the queue as running.
    pub fn is_running(&self) -> Result<bool> {
        let running: u32 = self
            .handle
            .get_property(PropertyAddress::global(ids::QUEUE_IS_RUNNING))?;
        Ok(running != 0)
    }

    pub fn buffer_count(&self) -> usize {
        self.handle.hub().pool.lock().len()
    }

    pub fn allocate_buffer(&mut self, capacity: u32) -> Result<QueueBuffer> {
        self.handle.ensure_live()?;
        let mut raw = ptr::null_mut();
        status::check(
            self.handle
                .engine()
                .allocate_buffer(self.handle.native_id(), capacity, &mut raw),
        )?;
        if raw.is_null() {
            return Err(Error::Fatal(Reason::InvalidBuffer));
        }
        let buffer = QueueBuffer::from_ptr(raw);
        self.handle.hub().pool.lock().insert(buffer, capacity);
        Ok(buffer)
    }

    /// Copy `data` into `buffer` and enqueue it.
    ///
    /// A buffer the engine still holds is refused with
    /// `Recoverable(BufferInQueue)` before anything is copied.
    pub fn enqueue(&mut self, buffer: QueueBuffer, data: &[u8]) -> Result<()> {
        self.handle.ensure_live()?;
        let hub = self.handle.hub();
        let mut pool = hub.pool.lock();
        let entry = *pool
            .entry(buffer)
            .ok_or(Error::Fatal(Reason::InvalidBuffer))?;
        if entry.in_flight {
            return Err(Error::Recoverable(Reason::BufferInQueue));
        }
        let len = u32::try_from(data.len())
            .ok()
            .filter(|&len| len <= entry.capacity)
            .ok_or(Error::Fatal(Reason::InvalidParameter))?;

        // SAFETY: the buffer is ours, idle, and at least `len` bytes long
        unsafe {
            let raw = &mut *buffer.as_ptr();
            if len > 0 {
                ptr::copy_nonoverlapping(data.as_ptr(), raw.audio_data.cast::<u8>(), len as usize);
            }
            raw.audio_data_byte_size = len;
        }

        // Marked before the call: the engine may complete it right away.
        pool.set_in_flight(buffer, true);
        drop(pool);
        let code = self
            .handle
            .engine()
            .enqueue_buffer(self.handle.native_id(), buffer.as_ptr());
        if let Err(err) = status::check(code) {
            hub.pool.lock().set_in_flight(buffer, false);
            return Err(err);
        }
        Ok(())
    }

    pub fn free_buffer(&mut self, buffer: QueueBuffer) -> Result<()> {
        self.handle.ensure_live()?;
        let hub = self.handle.hub();
        let entry = *hub
            .pool
            .lock()
            .entry(buffer)
            .ok_or(Error::Fatal(Reason::InvalidBuffer))?;
        if entry.in_flight {
            return Err(Error::Recoverable(Reason::BufferInQueue));
        }
        status::check(
            self.handle
                .engine()
                .free_buffer(self.handle.native_id(), buffer.as_ptr()),
        )?;
        hub.pool.lock().remove(buffer);
        Ok(())
    }

    /// Tear the queue down; disposing frees every buffer.
    pub fn teardown(&mut self) {
        self.handle.teardown();
        self.handle.hub().pool.lock().clear();
    }

    pub fn into_handle(self) -> ResourceHandle {
        self.handle
    }
}

impl Deref for AudioQueue {
    type Target = ResourceHandle;

    fn deref(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl DerefMut for AudioQueue {
    fn deref_mut(&mut self) -> &mut ResourceHandle {
        &mut self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::engine::NativeId;
    use crate::lifecycle::LifecycleState;
    use crate::soft::{SoftCall, SoftEngine};
    use crate::status::codes;
    use crate::thunk::{CallbackError, CallbackFailure, CallbackKind, CallbackResult, OutputContext};

    fn format() -> StreamFormat {
        StreamFormat::int16_interleaved(44_100.0, 2)
    }

    #[test]
    fn test_enqueue_complete_refill() {
        let engine = Arc::new(SoftEngine::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        let mut queue = AudioQueue::new_output(
            engine.clone(),
            format(),
            move |context: &mut OutputContext<'_>| -> CallbackResult {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(context.capacity(), 64);
                context.data_mut()[..8].fill(0x11);
                context.enqueue(8)?;
                Ok(())
            },
        )
        .unwrap();
        let id = queue.native_id();

        let first = queue.allocate_buffer(64).unwrap();
        let second = queue.allocate_buffer(64).unwrap();
        assert_eq!(queue.buffer_count(), 2);
        queue.enqueue(first, &[0u8; 32]).unwrap();
        queue.enqueue(second, &[0u8; 16]).unwrap();
        assert_eq!(engine.pending_buffers(id), 2);

        queue.initialize().unwrap();
        queue.start().unwrap();
        assert!(queue.is_running().unwrap());

        assert!(engine.complete_next(id));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pending_buffers(id), 2);
        assert_eq!(engine.buffer_byte_size(id, first.as_ptr()), Some(8));

        queue.teardown();
        assert_eq!(queue.state(), LifecycleState::Closed);
        assert_eq!(queue.buffer_count(), 0);
        assert_eq!(engine.object_count(), 0);
    }

    #[test]
    fn test_reentrant_completion_is_refused() {
        let engine = Arc::new(SoftEngine::new());
        let queue_id = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut queue = {
            let engine = Arc::clone(&engine);
            let queue_id = Arc::clone(&queue_id);
            let completed = Arc::clone(&completed);
            AudioQueue::new_output(
                engine.clone(),
                format(),
                move |context: &mut OutputContext<'_>| -> CallbackResult {
                    completed.fetch_add(1, Ordering::SeqCst);
                    context.enqueue(8)?;
                    // Completes the refill synchronously, re-entering this queue.
                    let id = NativeId::from_raw(queue_id.load(Ordering::SeqCst));
                    assert!(engine.complete_next(id));
                    Ok(())
                },
            )
            .unwrap()
        };
        queue_id.store(queue.native_id().as_raw(), Ordering::SeqCst);

        let buffer = queue.allocate_buffer(32).unwrap();
        queue.enqueue(buffer, &[0u8; 16]).unwrap();
        assert!(engine.complete_next(queue.native_id()));

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(queue.diagnostics().failure_count(), 1);
        assert_eq!(
            queue.diagnostics().last_failure(),
            Some(CallbackFailure::error(
                CallbackKind::OutputCompleted,
                codes::CANNOT_DO_IN_CURRENT_CONTEXT
            ))
        );
        queue.teardown();
        assert_eq!(engine.object_count(), 0);
    }

    #[test]
    fn test_enqueued_buffer_is_busy() {
        let engine = Arc::new(SoftEngine::new());
        let mut queue =
            AudioQueue::new_output(engine.clone(), format(), |_: &mut OutputContext<'_>| Ok(()))
                .unwrap();
        let buffer = queue.allocate_buffer(32).unwrap();
        queue.enqueue(buffer, &[1; 4]).unwrap();
        engine.reset_counts();

        let busy = Error::Recoverable(Reason::BufferInQueue);
        assert_eq!(queue.enqueue(buffer, &[1; 4]), Err(busy));
        assert_eq!(queue.free_buffer(buffer), Err(busy));
        assert_eq!(engine.total_calls(), 0);

        // Completed without a refill: idle again.
        assert!(engine.complete_next(queue.native_id()));
        queue.free_buffer(buffer).unwrap();
        assert_eq!(queue.buffer_count(), 0);
    }

    #[test]
    fn test_enqueue_validation() {
        let engine = Arc::new(SoftEngine::new());
        let mut queue =
            AudioQueue::new_output(engine.clone(), format(), |_: &mut OutputContext<'_>| Ok(()))
                .unwrap();
        let buffer = queue.allocate_buffer(8).unwrap();

        assert_eq!(
            queue.enqueue(buffer, &[0; 9]),
            Err(Error::Fatal(Reason::InvalidParameter))
        );
        assert_eq!(
            queue.enqueue(QueueBuffer(0x40), &[0; 4]),
            Err(Error::Fatal(Reason::InvalidBuffer))
        );
        // The engine refuses empty buffers; the pool must not think it is
        // still enqueued afterwards.
        assert_eq!(
            queue.enqueue(buffer, &[]),
            Err(Error::Fatal(Reason::InvalidBuffer))
        );
        queue.enqueue(buffer, &[0; 8]).unwrap();
    }

    #[test]
    fn test_handler_failure_is_recorded() {
        let engine = Arc::new(SoftEngine::new());
        let fail = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&fail);
        let mut queue = AudioQueue::new_output(
            engine.clone(),
            format(),
            move |_: &mut OutputContext<'_>| -> CallbackResult {
                if flag.load(Ordering::SeqCst) {
                    return Err(CallbackError::new(codes::QUEUE_INVALID_RUN_STATE));
                }
                Ok(())
            },
        )
        .unwrap();
        let buffer = queue.allocate_buffer(16).unwrap();
        queue.enqueue(buffer, &[0; 16]).unwrap();

        assert!(engine.complete_next(queue.native_id()));
        assert_eq!(
            queue.diagnostics().last_failure(),
            Some(CallbackFailure::error(
                CallbackKind::OutputCompleted,
                codes::QUEUE_INVALID_RUN_STATE
            ))
        );
        fail.store(false, Ordering::SeqCst);
        queue.enqueue(buffer, &[0; 16]).unwrap();
        assert!(engine.complete_next(queue.native_id()));
        assert_eq!(queue.diagnostics().failure_count(), 1);
    }

    #[test]
    fn test_create_failure_leaks_nothing() {
        let engine = Arc::new(SoftEngine::new());
        engine.fail_next(SoftCall::Create, codes::QUEUE_INVALID_PARAMETER);

        let err =
            AudioQueue::new_output(engine.clone(), format(), |_: &mut OutputContext<'_>| Ok(()))
                .unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::InvalidParameter));
        assert_eq!(engine.object_count(), 0);
    }
}
