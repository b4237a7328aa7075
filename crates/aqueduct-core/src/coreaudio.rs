//! AudioToolbox-backed engine (macOS).
//!
//! Thin `extern "C"` bindings: every [`Engine`] method forwards to the
//! matching AudioToolbox call and returns its status untouched. Units and
//! component instances share the `AudioUnit*` entry points; graphs map to
//! `AUGraph*`, queues to `AudioQueue*` and files to `AudioFile*`.

use std::ffi::c_void;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use crate::buffers::AudioBufferList;
use crate::config::ComponentDescription;
use crate::engine::{
    AudioQueueBuffer, AudioTimeStamp, CreateArgs, Engine, NativeId, NodeId, OutputCompletedFn,
    PropertyListenerFn, RenderCallbackFn, RenderCallbackStruct, ResourceKind, Target,
};
use crate::format::StreamFormat;
use crate::property::{ids, PropertyAddress, Scope};
use crate::status::{codes, OsStatus, NO_ERR};

type Object = *mut c_void;
type CfUrl = *const c_void;

/// `kAudioFileReadPermission`
const FILE_READ_PERMISSION: i8 = 1;

#[link(name = "AudioToolbox", kind = "framework")]
extern "C" {
    fn AudioComponentFindNext(component: Object, description: *const ComponentDescription) -> Object;
    fn AudioComponentInstanceNew(component: Object, out: *mut Object) -> OsStatus;
    fn AudioComponentInstanceDispose(instance: Object) -> OsStatus;

    fn AudioUnitInitialize(unit: Object) -> OsStatus;
    fn AudioUnitUninitialize(unit: Object) -> OsStatus;
    fn AudioOutputUnitStart(unit: Object) -> OsStatus;
    fn AudioOutputUnitStop(unit: Object) -> OsStatus;
    fn AudioUnitGetPropertyInfo(
        unit: Object,
        id: u32,
        scope: u32,
        element: u32,
        size: *mut u32,
        writable: *mut u8,
    ) -> OsStatus;
    fn AudioUnitGetProperty(
        unit: Object,
        id: u32,
        scope: u32,
        element: u32,
        data: *mut c_void,
        size: *mut u32,
    ) -> OsStatus;
    fn AudioUnitSetProperty(
        unit: Object,
        id: u32,
        scope: u32,
        element: u32,
        data: *const c_void,
        size: u32,
    ) -> OsStatus;
    fn AudioUnitAddPropertyListener(
        unit: Object,
        id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus;
    fn AudioUnitRemovePropertyListenerWithUserData(
        unit: Object,
        id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus;
    fn AudioUnitRender(
        unit: Object,
        action_flags: *mut u32,
        time_stamp: *const AudioTimeStamp,
        bus: u32,
        frames: u32,
        io_data: *mut AudioBufferList,
    ) -> OsStatus;

    fn NewAUGraph(out: *mut Object) -> OsStatus;
    fn DisposeAUGraph(graph: Object) -> OsStatus;
    fn AUGraphOpen(graph: Object) -> OsStatus;
    fn AUGraphClose(graph: Object) -> OsStatus;
    fn AUGraphInitialize(graph: Object) -> OsStatus;
    fn AUGraphUninitialize(graph: Object) -> OsStatus;
    fn AUGraphStart(graph: Object) -> OsStatus;
    fn AUGraphStop(graph: Object) -> OsStatus;
    fn AUGraphIsInitialized(graph: Object, out: *mut u8) -> OsStatus;
    fn AUGraphUpdate(graph: Object, is_updated: *mut u8) -> OsStatus;
    fn AUGraphAddNode(
        graph: Object,
        description: *const ComponentDescription,
        out: *mut NodeId,
    ) -> OsStatus;
    fn AUGraphRemoveNode(graph: Object, node: NodeId) -> OsStatus;
    fn AUGraphConnectNodeInput(
        graph: Object,
        source: NodeId,
        source_output: u32,
        dest: NodeId,
        dest_input: u32,
    ) -> OsStatus;
    fn AUGraphDisconnectNodeInput(graph: Object, dest: NodeId, dest_input: u32) -> OsStatus;

    fn AudioQueueNewOutput(
        format: *const StreamFormat,
        callback: OutputCompletedFn,
        user_data: *mut c_void,
        run_loop: *const c_void,
        run_loop_mode: *const c_void,
        flags: u32,
        out: *mut Object,
    ) -> OsStatus;
    fn AudioQueueDispose(queue: Object, immediate: u8) -> OsStatus;
    fn AudioQueueStart(queue: Object, start_time: *const AudioTimeStamp) -> OsStatus;
    fn AudioQueueStop(queue: Object, immediate: u8) -> OsStatus;
    fn AudioQueueAllocateBuffer(
        queue: Object,
        capacity: u32,
        out: *mut *mut AudioQueueBuffer,
    ) -> OsStatus;
    fn AudioQueueFreeBuffer(queue: Object, buffer: *mut AudioQueueBuffer) -> OsStatus;
    fn AudioQueueEnqueueBuffer(
        queue: Object,
        buffer: *mut AudioQueueBuffer,
        packet_description_count: u32,
        packet_descriptions: *const c_void,
    ) -> OsStatus;
    fn AudioQueueGetPropertySize(queue: Object, id: u32, size: *mut u32) -> OsStatus;
    fn AudioQueueGetProperty(queue: Object, id: u32, data: *mut c_void, size: *mut u32) -> OsStatus;
    fn AudioQueueSetProperty(queue: Object, id: u32, data: *const c_void, size: u32) -> OsStatus;

    fn AudioFileOpenURL(url: CfUrl, permissions: i8, type_hint: u32, out: *mut Object) -> OsStatus;
    fn AudioFileClose(file: Object) -> OsStatus;
    fn AudioFileGetPropertyInfo(file: Object, id: u32, size: *mut u32, writable: *mut u32) -> OsStatus;
    fn AudioFileGetProperty(file: Object, id: u32, size: *mut u32, data: *mut c_void) -> OsStatus;
    fn AudioFileSetProperty(file: Object, id: u32, size: u32, data: *const c_void) -> OsStatus;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFURLCreateFromFileSystemRepresentation(
        allocator: *const c_void,
        path: *const u8,
        len: isize,
        is_directory: u8,
    ) -> CfUrl;
    fn CFRelease(object: *const c_void);
}

/// The AudioToolbox engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreAudioEngine;

impl CoreAudioEngine {
    pub const fn new() -> Self {
        Self
    }

    fn set_callback(
        &self,
        target: Target,
        address: PropertyAddress,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus {
        if !is_unit(target.kind) {
            return codes::HARDWARE_BAD_OBJECT;
        }
        let payload = RenderCallbackStruct {
            input_proc: callback,
            input_proc_ref_con: if callback.is_some() { user_data } else { ptr::null_mut() },
        };
        // SAFETY: live unit; the payload outlives the call
        unsafe {
            AudioUnitSetProperty(
                target.id.as_ptr(),
                address.id,
                address.scope,
                address.element,
                (&payload as *const RenderCallbackStruct).cast(),
                std::mem::size_of::<RenderCallbackStruct>() as u32,
            )
        }
    }

    /// Commit pending topology edits when the graph is already initialized.
    fn commit(graph: Object, status: OsStatus) -> OsStatus {
        if status != NO_ERR {
            return status;
        }
        let mut initialized = 0u8;
        // SAFETY: live graph
        unsafe {
            let status = AUGraphIsInitialized(graph, &mut initialized);
            if status != NO_ERR || initialized == 0 {
                return status;
            }
            AUGraphUpdate(graph, ptr::null_mut())
        }
    }
}

fn is_unit(kind: ResourceKind) -> bool {
    matches!(kind, ResourceKind::Unit | ResourceKind::ComponentInstance)
}

unsafe fn open_file(path: &std::path::Path, out: &mut Object) -> OsStatus {
    let bytes = path.as_os_str().as_bytes();
    let url = CFURLCreateFromFileSystemRepresentation(
        ptr::null(),
        bytes.as_ptr(),
        bytes.len() as isize,
        0,
    );
    if url.is_null() {
        return codes::PARAM_ERR;
    }
    let status = AudioFileOpenURL(url, FILE_READ_PERMISSION, 0, out);
    CFRelease(url);
    status
}

impl Engine for CoreAudioEngine {
    fn name(&self) -> &'static str {
        "coreaudio"
    }

    fn create(&self, args: &CreateArgs<'_>, user_data: *mut c_void, out: &mut NativeId) -> OsStatus {
        let mut raw: Object = ptr::null_mut();
        // SAFETY: every out-pointer refers to `raw`
        let status = unsafe {
            match *args {
                CreateArgs::Graph => NewAUGraph(&mut raw),
                CreateArgs::Unit(description) | CreateArgs::ComponentInstance(description) => {
                    let component = AudioComponentFindNext(ptr::null_mut(), &description);
                    if component.is_null() {
                        return codes::PARAM_ERR;
                    }
                    AudioComponentInstanceNew(component, &mut raw)
                }
                CreateArgs::OutputQueue { format, callback } => AudioQueueNewOutput(
                    &format,
                    callback,
                    user_data,
                    ptr::null(),
                    ptr::null(),
                    0,
                    &mut raw,
                ),
                CreateArgs::File { path } => open_file(path, &mut raw),
            }
        };
        if status == NO_ERR {
            *out = NativeId::from_ptr(raw);
        }
        status
    }

    fn dispose(&self, target: Target) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: the handle owns `object` and disposes it once
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => {
                    AudioComponentInstanceDispose(object)
                }
                ResourceKind::Graph => DisposeAUGraph(object),
                ResourceKind::Queue => AudioQueueDispose(object, 1),
                ResourceKind::File => AudioFileClose(object),
            }
        }
    }

    fn open(&self, target: Target) -> OsStatus {
        match target.kind {
            // SAFETY: live graph
            ResourceKind::Graph => unsafe { AUGraphOpen(target.id.as_ptr()) },
            _ => NO_ERR,
        }
    }

    fn close(&self, target: Target) -> OsStatus {
        match target.kind {
            // SAFETY: live graph
            ResourceKind::Graph => unsafe { AUGraphClose(target.id.as_ptr()) },
            _ => NO_ERR,
        }
    }

    fn initialize(&self, target: Target) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: live object of the given kind
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => AudioUnitInitialize(object),
                ResourceKind::Graph => AUGraphInitialize(object),
                ResourceKind::Queue => NO_ERR,
                ResourceKind::File => codes::UNIMPLEMENTED,
            }
        }
    }

    fn uninitialize(&self, target: Target) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: live object of the given kind
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => {
                    AudioUnitUninitialize(object)
                }
                ResourceKind::Graph => AUGraphUninitialize(object),
                ResourceKind::Queue => NO_ERR,
                ResourceKind::File => codes::UNIMPLEMENTED,
            }
        }
    }

    fn start(&self, target: Target) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: live object of the given kind
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => AudioOutputUnitStart(object),
                ResourceKind::Graph => AUGraphStart(object),
                ResourceKind::Queue => AudioQueueStart(object, ptr::null()),
                ResourceKind::File => codes::UNIMPLEMENTED,
            }
        }
    }

    fn stop(&self, target: Target) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: live object of the given kind
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => AudioOutputUnitStop(object),
                ResourceKind::Graph => AUGraphStop(object),
                ResourceKind::Queue => AudioQueueStop(object, 1),
                ResourceKind::File => codes::UNIMPLEMENTED,
            }
        }
    }

    fn add_node(
        &self,
        graph: NativeId,
        description: &ComponentDescription,
        out: &mut NodeId,
    ) -> OsStatus {
        let graph = graph.as_ptr();
        // SAFETY: live graph
        Self::commit(graph, unsafe { AUGraphAddNode(graph, description, out) })
    }

    fn remove_node(&self, graph: NativeId, node: NodeId) -> OsStatus {
        let graph = graph.as_ptr();
        // SAFETY: live graph
        Self::commit(graph, unsafe { AUGraphRemoveNode(graph, node) })
    }

    fn connect(
        &self,
        graph: NativeId,
        source: NodeId,
        source_output: u32,
        dest: NodeId,
        dest_input: u32,
    ) -> OsStatus {
        let graph = graph.as_ptr();
        // SAFETY: live graph
        let status = unsafe { AUGraphConnectNodeInput(graph, source, source_output, dest, dest_input) };
        Self::commit(graph, status)
    }

    fn disconnect(&self, graph: NativeId, dest: NodeId, dest_input: u32) -> OsStatus {
        let graph = graph.as_ptr();
        // SAFETY: live graph
        Self::commit(graph, unsafe { AUGraphDisconnectNodeInput(graph, dest, dest_input) })
    }

    fn property_info(
        &self,
        target: Target,
        address: PropertyAddress,
        size: &mut u32,
        writable: &mut bool,
    ) -> OsStatus {
        let object = target.id.as_ptr();
        // SAFETY: live object; out-pointers are local
        unsafe {
            match target.kind {
                ResourceKind::Unit | ResourceKind::ComponentInstance => {
                    let mut flag = 0u8;
                    let status = AudioUnitGetPropertyInfo(
                        object,
                        address.id,
                        address.scope,
                        address.element,
                        size,
                        &mut flag,
                    );
                    *writable = flag != 0;
                    status
                }
                ResourceKind::Queue => {
                    *writable = address.id != ids::QUEUE_IS_RUNNING;
                    AudioQueueGetPropertySize(object, address.id, size)
                }
                ResourceKind::File => {
                    let mut flag = 0u32;
                    let status = AudioFileGetPropertyInfo(object, address.id, size, &mut flag);
                    *writable = flag != 0;
                    status
                }
                ResourceKind::Graph => codes::INVALID_PROPERTY,
            }
        }
    }

    unsafe fn get_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *mut c_void,
        size: &mut u32,
    ) -> OsStatus {
        let object = target.id.as_ptr();
        match target.kind {
            ResourceKind::Unit | ResourceKind::ComponentInstance => AudioUnitGetProperty(
                object,
                address.id,
                address.scope,
                address.element,
                data,
                size,
            ),
            ResourceKind::Queue => AudioQueueGetProperty(object, address.id, data, size),
            ResourceKind::File => AudioFileGetProperty(object, address.id, size, data),
            ResourceKind::Graph => codes::INVALID_PROPERTY,
        }
    }

    unsafe fn set_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *const c_void,
        size: u32,
    ) -> OsStatus {
        let object = target.id.as_ptr();
        match target.kind {
            ResourceKind::Unit | ResourceKind::ComponentInstance => AudioUnitSetProperty(
                object,
                address.id,
                address.scope,
                address.element,
                data,
                size,
            ),
            ResourceKind::Queue => AudioQueueSetProperty(object, address.id, data, size),
            ResourceKind::File => AudioFileSetProperty(object, address.id, size, data),
            ResourceKind::Graph => codes::INVALID_PROPERTY,
        }
    }

    fn add_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus {
        if !is_unit(target.kind) {
            // Queue listeners use a different callback signature.
            return codes::UNIMPLEMENTED;
        }
        // SAFETY: live unit
        unsafe { AudioUnitAddPropertyListener(target.id.as_ptr(), property_id, listener, user_data) }
    }

    fn remove_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus {
        if !is_unit(target.kind) {
            return codes::UNIMPLEMENTED;
        }
        // SAFETY: live unit
        unsafe {
            AudioUnitRemovePropertyListenerWithUserData(
                target.id.as_ptr(),
                property_id,
                listener,
                user_data,
            )
        }
    }

    fn set_render_callback(
        &self,
        target: Target,
        element: u32,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.set_callback(
            target,
            PropertyAddress::new(ids::SET_RENDER_CALLBACK, Scope::Input, element),
            callback,
            user_data,
        )
    }

    fn set_input_callback(
        &self,
        target: Target,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.set_callback(
            target,
            PropertyAddress::global(ids::SET_INPUT_CALLBACK),
            callback,
            user_data,
        )
    }

    unsafe fn render(
        &self,
        target: Target,
        action_flags: *mut u32,
        time_stamp: &AudioTimeStamp,
        bus: u32,
        frames: u32,
        io_data: *mut AudioBufferList,
    ) -> OsStatus {
        if !is_unit(target.kind) {
            return codes::HARDWARE_BAD_OBJECT;
        }
        AudioUnitRender(target.id.as_ptr(), action_flags, time_stamp, bus, frames, io_data)
    }

    fn allocate_buffer(
        &self,
        queue: NativeId,
        capacity: u32,
        out: &mut *mut AudioQueueBuffer,
    ) -> OsStatus {
        // SAFETY: live queue
        unsafe { AudioQueueAllocateBuffer(queue.as_ptr(), capacity, out) }
    }

    fn free_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus {
        // SAFETY: live queue; the buffer belongs to it
        unsafe { AudioQueueFreeBuffer(queue.as_ptr(), buffer) }
    }

    fn enqueue_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus {
        // SAFETY: live queue; the buffer belongs to it
        unsafe { AudioQueueEnqueueBuffer(queue.as_ptr(), buffer, 0, ptr::null()) }
    }
}
