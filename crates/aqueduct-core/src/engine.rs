//! The native engine seam.
//!
//! [`Engine`] is the narrow surface the bridge consumes: allocate and
//! destroy resources, drive their lifecycle, read and write property blocks,
//! and register callbacks. Every method returns the raw native status; the
//! bridge classifies it through [`crate::status`].
//!
//! Two implementations ship with the crate: [`crate::soft::SoftEngine`]
//! (in-process, portable) and, on macOS, `CoreAudioEngine` backed by
//! AudioToolbox.

use std::ffi::c_void;
use std::fmt;
use std::path::Path;

use crate::buffers::AudioBufferList;
use crate::config::ComponentDescription;
use crate::format::StreamFormat;
use crate::property::PropertyAddress;
use crate::status::OsStatus;

/// Opaque native object identifier.
///
/// Compared only for equality; never dereferenced by the bridge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(usize);

impl NativeId {
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl fmt::Debug for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeId({:#x})", self.0)
    }
}

/// Engine-assigned graph node identifier (`AUNode`).
pub type NodeId = i32;

/// The kind of native object a handle owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Queue,
    Unit,
    Graph,
    ComponentInstance,
    File,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Unit => "unit",
            Self::Graph => "graph",
            Self::ComponentInstance => "component instance",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A native object addressed by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: ResourceKind,
    pub id: NativeId,
}

impl Target {
    pub const fn new(kind: ResourceKind, id: NativeId) -> Self {
        Self { kind, id }
    }
}

/// Arguments to the native allocator.
#[derive(Debug, Clone, Copy)]
pub enum CreateArgs<'a> {
    Graph,
    Unit(ComponentDescription),
    ComponentInstance(ComponentDescription),
    /// Output queues bind their completion callback at creation.
    OutputQueue {
        format: StreamFormat,
        callback: OutputCompletedFn,
    },
    File { path: &'a Path },
}

impl CreateArgs<'_> {
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Graph => ResourceKind::Graph,
            Self::Unit(_) => ResourceKind::Unit,
            Self::ComponentInstance(_) => ResourceKind::ComponentInstance,
            Self::OutputQueue { .. } => ResourceKind::Queue,
            Self::File { .. } => ResourceKind::File,
        }
    }

    /// True when the native create receives the context token.
    pub const fn binds_user_data(&self) -> bool {
        matches!(self, Self::OutputQueue { .. })
    }
}

/// SMPTE time (`SMPTETime`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmpteTime {
    pub subframes: i16,
    pub subframe_divisor: i16,
    pub counter: u32,
    pub smpte_type: u32,
    pub flags: u32,
    pub hours: i16,
    pub minutes: i16,
    pub seconds: i16,
    pub frames: i16,
}

pub const TIME_STAMP_SAMPLE_TIME_VALID: u32 = 1 << 0;
pub const TIME_STAMP_HOST_TIME_VALID: u32 = 1 << 1;

/// Audio time stamp (`AudioTimeStamp`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioTimeStamp {
    pub sample_time: f64,
    pub host_time: u64,
    pub rate_scalar: f64,
    pub word_clock_time: u64,
    pub smpte_time: SmpteTime,
    pub flags: u32,
    pub reserved: u32,
}

impl AudioTimeStamp {
    pub const fn with_sample_time(sample_time: f64) -> Self {
        Self {
            sample_time,
            host_time: 0,
            rate_scalar: 1.0,
            word_clock_time: 0,
            smpte_time: SmpteTime {
                subframes: 0,
                subframe_divisor: 0,
                counter: 0,
                smpte_type: 0,
                flags: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
                frames: 0,
            },
            flags: TIME_STAMP_SAMPLE_TIME_VALID,
            reserved: 0,
        }
    }
}

/// Native queue buffer (`AudioQueueBuffer`).
#[repr(C)]
#[derive(Debug)]
pub struct AudioQueueBuffer {
    pub audio_data_bytes_capacity: u32,
    pub audio_data: *mut c_void,
    pub audio_data_byte_size: u32,
    pub user_data: *mut c_void,
    pub packet_description_capacity: u32,
    pub packet_descriptions: *mut c_void,
    pub packet_description_count: u32,
}

/// Render and input callback (`AURenderCallback`).
pub type RenderCallbackFn = unsafe extern "C" fn(
    ref_con: *mut c_void,
    action_flags: *mut u32,
    time_stamp: *const AudioTimeStamp,
    bus_number: u32,
    number_frames: u32,
    io_data: *mut AudioBufferList,
) -> OsStatus;

/// Property-changed callback (`AudioUnitPropertyListenerProc`).
pub type PropertyListenerFn = unsafe extern "C" fn(
    ref_con: *mut c_void,
    unit: *mut c_void,
    property_id: u32,
    scope: u32,
    element: u32,
);

/// Output queue completion callback (`AudioQueueOutputCallback`).
pub type OutputCompletedFn =
    unsafe extern "C" fn(user_data: *mut c_void, queue: *mut c_void, buffer: *mut AudioQueueBuffer);

/// `AURenderCallbackStruct`, the payload of the render/input callback
/// properties.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RenderCallbackStruct {
    pub input_proc: Option<RenderCallbackFn>,
    pub input_proc_ref_con: *mut c_void,
}

/// The native audio engine.
///
/// Implementations must be callable from any thread. Methods never panic;
/// failures are reported through the returned status.
pub trait Engine: Send + Sync + 'static {
    /// Human-readable engine name for logs.
    fn name(&self) -> &'static str;

    /// Allocate a native object. `user_data` is the context token when
    /// [`CreateArgs::binds_user_data`] is true, null otherwise.
    fn create(&self, args: &CreateArgs<'_>, user_data: *mut c_void, out: &mut NativeId) -> OsStatus;

    /// Release a native object. Disposing a queue frees its buffers.
    fn dispose(&self, target: Target) -> OsStatus;

    fn open(&self, target: Target) -> OsStatus;
    fn close(&self, target: Target) -> OsStatus;
    fn initialize(&self, target: Target) -> OsStatus;
    fn uninitialize(&self, target: Target) -> OsStatus;
    fn start(&self, target: Target) -> OsStatus;
    fn stop(&self, target: Target) -> OsStatus;

    fn add_node(
        &self,
        graph: NativeId,
        description: &ComponentDescription,
        out: &mut NodeId,
    ) -> OsStatus;
    fn remove_node(&self, graph: NativeId, node: NodeId) -> OsStatus;
    fn connect(
        &self,
        graph: NativeId,
        source: NodeId,
        source_output: u32,
        dest: NodeId,
        dest_input: u32,
    ) -> OsStatus;
    fn disconnect(&self, graph: NativeId, dest: NodeId, dest_input: u32) -> OsStatus;

    fn property_info(
        &self,
        target: Target,
        address: PropertyAddress,
        size: &mut u32,
        writable: &mut bool,
    ) -> OsStatus;

    /// Copy a property into `data`. On entry `size` is the capacity of
    /// `data`, on return the number of bytes written.
    ///
    /// # Safety
    ///
    /// `data` must be valid for writes of `*size` bytes.
    unsafe fn get_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *mut c_void,
        size: &mut u32,
    ) -> OsStatus;

    /// # Safety
    ///
    /// `data` must be valid for reads of `size` bytes.
    unsafe fn set_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *const c_void,
        size: u32,
    ) -> OsStatus;

    fn add_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus;

    fn remove_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus;

    /// Install or clear (with `None`) the render callback of an input
    /// element.
    fn set_render_callback(
        &self,
        target: Target,
        element: u32,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus;

    /// Install or clear the input-available callback of an I/O unit.
    fn set_input_callback(
        &self,
        target: Target,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus;

    /// Pull rendered audio from a unit into `io_data`.
    ///
    /// # Safety
    ///
    /// `io_data` must point to a valid buffer list whose buffers are
    /// writable for their declared sizes.
    unsafe fn render(
        &self,
        target: Target,
        action_flags: *mut u32,
        time_stamp: &AudioTimeStamp,
        bus: u32,
        frames: u32,
        io_data: *mut AudioBufferList,
    ) -> OsStatus;

    fn allocate_buffer(
        &self,
        queue: NativeId,
        capacity: u32,
        out: &mut *mut AudioQueueBuffer,
    ) -> OsStatus;

    fn free_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus;

    fn enqueue_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_id_null() {
        assert!(NativeId::NULL.is_null());
        assert!(!NativeId::from_raw(0x10).is_null());
        assert_eq!(NativeId::from_raw(7).as_raw(), 7);
    }

    #[test]
    fn test_native_id_ptr_roundtrip() {
        let mut value = 0u8;
        let id = NativeId::from_ptr(&mut value as *mut u8);
        assert_eq!(id.as_ptr::<u8>(), &mut value as *mut u8);
    }

    #[test]
    fn test_create_args_kind() {
        assert_eq!(CreateArgs::Graph.kind(), ResourceKind::Graph);
        assert_eq!(
            CreateArgs::Unit(ComponentDescription::DEFAULT_OUTPUT).kind(),
            ResourceKind::Unit
        );
        assert!(!CreateArgs::Graph.binds_user_data());
    }

    #[test]
    fn test_ffi_layouts() {
        assert_eq!(std::mem::size_of::<SmpteTime>(), 24);
        assert_eq!(std::mem::size_of::<AudioTimeStamp>(), 64);
    }
}
