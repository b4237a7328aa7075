//! In-process software engine.
//!
//! [`SoftEngine`] implements [`Engine`] entirely in Rust with the status
//! codes and state rules of the native engine: topology changes while a
//! graph runs fail with `-10863`, a second initialize with `-10849`, a
//! second output node with `-10862`, and so on. It also exposes drivers
//! that play the part of the engine's own threads (`render_cycle`,
//! `fire_input`, `complete_next`, `notify_property`), callable from any
//! thread, and counts every call made through the [`Engine`] trait.
//!
//! Callbacks are always invoked with the internal lock released, so they
//! may call back into the engine.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;

use parking_lot::{Mutex, MutexGuard};

use crate::buffers::{self, AudioBufferList, BufferScratch};
use crate::config::{ComponentDescription, ComponentType};
use crate::engine::{
    AudioQueueBuffer, AudioTimeStamp, CreateArgs, Engine, NativeId, NodeId, OutputCompletedFn,
    PropertyListenerFn, RenderCallbackFn, ResourceKind, Target,
};
use crate::format::StreamFormat;
use crate::property::{ids, PropertyAddress, Scope};
use crate::status::{codes, OsStatus, NO_ERR};
use crate::thunk::RENDER_ACTION_OUTPUT_IS_SILENCE;

/// Engine entry points, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftCall {
    Create,
    Dispose,
    Open,
    Close,
    Initialize,
    Uninitialize,
    Start,
    Stop,
    AddNode,
    RemoveNode,
    Connect,
    Disconnect,
    PropertyInfo,
    GetProperty,
    SetProperty,
    AddPropertyListener,
    RemovePropertyListener,
    SetRenderCallback,
    SetInputCallback,
    Render,
    AllocateBuffer,
    FreeBuffer,
    EnqueueBuffer,
}

/// A file the engine pretends exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualFile {
    pub format: StreamFormat,
    pub packet_count: u64,
}

/// Outcome of one driven render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderReport {
    pub status: OsStatus,
    pub action_flags: u32,
}

const MAX_FRAMES_PER_SLICE: u32 = 1156;
const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

type PropertyKey = (u32, u32, u32);

#[derive(Clone, Copy)]
struct Listener {
    property_id: u32,
    proc_: PropertyListenerFn,
    user_data: usize,
}

#[derive(Clone, Copy)]
struct Callback {
    proc_: RenderCallbackFn,
    user_data: usize,
}

struct SoftBuffer {
    header: usize,
    data: usize,
    capacity: u32,
}

impl SoftBuffer {
    fn allocate(capacity: u32) -> Self {
        let data = Box::into_raw(vec![0u8; capacity as usize].into_boxed_slice());
        let header = Box::into_raw(Box::new(AudioQueueBuffer {
            audio_data_bytes_capacity: capacity,
            audio_data: data.cast::<c_void>(),
            audio_data_byte_size: 0,
            user_data: ptr::null_mut(),
            packet_description_capacity: 0,
            packet_descriptions: ptr::null_mut(),
            packet_description_count: 0,
        }));
        Self {
            header: header as usize,
            data: data.cast::<u8>() as usize,
            capacity,
        }
    }

    fn byte_size(&self) -> u32 {
        // SAFETY: header is live until `free`
        unsafe { (*(self.header as *const AudioQueueBuffer)).audio_data_byte_size }
    }

    fn free(self) {
        // SAFETY: both allocations come from `allocate` and are freed once
        unsafe {
            drop(Box::from_raw(self.header as *mut AudioQueueBuffer));
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.data as *mut u8,
                self.capacity as usize,
            )));
        }
    }
}

struct SoftObject {
    kind: ResourceKind,
    opened: bool,
    initialized: bool,
    running: bool,
    properties: HashMap<PropertyKey, Vec<u8>>,
    read_only: HashSet<u32>,
    listeners: Vec<Listener>,
    render_callbacks: HashMap<u32, Callback>,
    input_callback: Option<Callback>,
    input_level: Option<f32>,
    sample_time: f64,
    // Graphs
    nodes: BTreeMap<NodeId, ComponentDescription>,
    next_node: NodeId,
    connections: BTreeMap<(NodeId, u32), (NodeId, u32)>,
    // Queues
    output_callback: Option<(OutputCompletedFn, usize)>,
    buffers: Vec<SoftBuffer>,
    pending: VecDeque<usize>,
}

impl SoftObject {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            opened: kind != ResourceKind::Graph,
            initialized: false,
            running: false,
            properties: HashMap::new(),
            read_only: HashSet::new(),
            listeners: Vec::new(),
            render_callbacks: HashMap::new(),
            input_callback: None,
            input_level: None,
            sample_time: 0.0,
            nodes: BTreeMap::new(),
            next_node: 1,
            connections: BTreeMap::new(),
            output_callback: None,
            buffers: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn put<T: Copy>(&mut self, address: PropertyAddress, value: T) {
        // SAFETY: only called with the crate's plain-data FFI types
        let bytes = unsafe {
            std::slice::from_raw_parts((&value as *const T).cast::<u8>(), std::mem::size_of::<T>())
        };
        self.properties
            .insert((address.id, address.scope, address.element), bytes.to_vec());
    }

    fn put_read_only<T: Copy>(&mut self, address: PropertyAddress, value: T) {
        self.put(address, value);
        self.read_only.insert(address.id);
    }

    fn listeners_for(&self, property_id: u32) -> impl Iterator<Item = Listener> + '_ {
        self.listeners
            .iter()
            .copied()
            .filter(move |l| l.property_id == property_id)
    }

    fn has_output_node(&self) -> bool {
        self.nodes.values().any(ComponentDescription::is_output)
    }

    fn buffer_index(&self, header: usize) -> Option<usize> {
        self.buffers.iter().position(|b| b.header == header)
    }
}

/// A property change waiting to be reported once the lock is released.
struct Notification {
    listener: Listener,
    object: usize,
    address: PropertyAddress,
}

impl Notification {
    fn fire(self) {
        // SAFETY: listeners are registered with valid C callbacks
        unsafe {
            (self.listener.proc_)(
                self.listener.user_data as *mut c_void,
                self.object as *mut c_void,
                self.address.id,
                self.address.scope,
                self.address.element,
            )
        }
    }
}

#[derive(Default)]
struct SoftState {
    next_id: usize,
    objects: HashMap<usize, SoftObject>,
    calls: HashMap<SoftCall, usize>,
    failures: HashMap<SoftCall, OsStatus>,
    files: HashMap<PathBuf, VirtualFile>,
}

impl SoftState {
    fn object(&mut self, target: Target) -> Result<&mut SoftObject, OsStatus> {
        match self.objects.get_mut(&target.id.as_raw()) {
            Some(object) if object.kind == target.kind => Ok(object),
            _ => Err(codes::HARDWARE_BAD_OBJECT),
        }
    }

    fn graph(&mut self, graph: NativeId) -> Result<&mut SoftObject, OsStatus> {
        let graph = self.object(Target::new(ResourceKind::Graph, graph))?;
        if graph.running {
            return Err(codes::CANNOT_DO_IN_CURRENT_CONTEXT);
        }
        Ok(graph)
    }

    fn queue(&mut self, queue: NativeId) -> Result<&mut SoftObject, OsStatus> {
        self.object(Target::new(ResourceKind::Queue, queue))
    }

    fn any(&mut self, id: NativeId) -> Result<&mut SoftObject, OsStatus> {
        self.objects
            .get_mut(&id.as_raw())
            .ok_or(codes::HARDWARE_BAD_OBJECT)
    }
}

/// The software engine.
pub struct SoftEngine {
    state: Mutex<SoftState>,
}

impl SoftEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SoftState {
                next_id: 0x1000,
                ..SoftState::default()
            }),
        }
    }

    fn begin(&self, call: SoftCall) -> Result<MutexGuard<'_, SoftState>, OsStatus> {
        let mut state = self.state.lock();
        *state.calls.entry(call).or_default() += 1;
        match state.failures.remove(&call) {
            Some(code) => Err(code),
            None => Ok(state),
        }
    }

    fn run(
        &self,
        call: SoftCall,
        f: impl FnOnce(&mut SoftState) -> Result<Vec<Notification>, OsStatus>,
    ) -> OsStatus {
        let notifications = match self.begin(call) {
            Ok(mut state) => f(&mut state),
            Err(code) => return code,
        };
        match notifications {
            Ok(notifications) => {
                notifications.into_iter().for_each(Notification::fire);
                NO_ERR
            }
            Err(code) => code,
        }
    }

    // -- test drivers -------------------------------------------------------

    /// Make the next call of `call` fail with `status`.
    pub fn fail_next(&self, call: SoftCall, status: OsStatus) {
        self.state.lock().failures.insert(call, status);
    }

    pub fn call_count(&self, call: SoftCall) -> usize {
        self.state.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn reset_counts(&self) {
        self.state.lock().calls.clear();
    }

    pub fn add_virtual_file(&self, path: impl AsRef<Path>, file: VirtualFile) {
        self.state
            .lock()
            .files
            .insert(path.as_ref().to_path_buf(), file);
    }

    /// Live native objects.
    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_running(&self, id: NativeId) -> bool {
        self.state
            .lock()
            .objects
            .get(&id.as_raw())
            .is_some_and(|o| o.running)
    }

    pub fn is_initialized(&self, id: NativeId) -> bool {
        self.state
            .lock()
            .objects
            .get(&id.as_raw())
            .is_some_and(|o| o.initialized)
    }

    /// Listener registrations on an object, across all properties.
    pub fn live_listener_count(&self, id: NativeId) -> usize {
        self.state
            .lock()
            .objects
            .get(&id.as_raw())
            .map_or(0, |o| o.listeners.len())
    }

    pub fn listener_count(&self, id: NativeId, property_id: u32) -> usize {
        self.state
            .lock()
            .objects
            .get(&id.as_raw())
            .map_or(0, |o| o.listeners_for(property_id).count())
    }

    pub fn has_render_callback(&self, id: NativeId, element: u32) -> bool {
        self.state
            .lock()
            .objects
            .get(&id.as_raw())
            .is_some_and(|o| o.render_callbacks.contains_key(&element))
    }

    /// The source feeding a graph node input, as the engine sees it.
    pub fn native_connection(
        &self,
        graph: NativeId,
        dest: NodeId,
        dest_input: u32,
    ) -> Option<(NodeId, u32)> {
        self.state
            .lock()
            .objects
            .get(&graph.as_raw())
            .and_then(|g| g.connections.get(&(dest, dest_input)).copied())
    }

    pub fn native_node_count(&self, graph: NativeId) -> usize {
        self.state
            .lock()
            .objects
            .get(&graph.as_raw())
            .map_or(0, |g| g.nodes.len())
    }

    pub fn pending_buffers(&self, queue: NativeId) -> usize {
        self.state
            .lock()
            .objects
            .get(&queue.as_raw())
            .map_or(0, |q| q.pending.len())
    }

    /// Make renders without a callback produce `level` instead of silence.
    pub fn set_input_level(&self, id: NativeId, level: Option<f32>) {
        if let Some(object) = self.state.lock().objects.get_mut(&id.as_raw()) {
            object.input_level = level;
        }
    }

    /// Drive one render cycle on `unit`, as the render thread would.
    pub fn render_cycle(
        &self,
        unit: NativeId,
        bus: u32,
        frames: u32,
        buffers: &mut crate::buffers::OwnedBufferList,
    ) -> RenderReport {
        let mut action_flags = 0;
        // SAFETY: `buffers` owns a valid record
        let status = unsafe { self.pull(unit, &mut action_flags, None, bus, frames, buffers.as_mut_ptr()) };
        RenderReport {
            status,
            action_flags,
        }
    }

    /// Report available input on an I/O unit.
    pub fn fire_input(&self, unit: NativeId, bus: u32, frames: u32) -> OsStatus {
        let (callback, time_stamp) = {
            let mut state = self.state.lock();
            let Ok(object) = state.any(unit) else {
                return codes::HARDWARE_BAD_OBJECT;
            };
            let time_stamp = AudioTimeStamp::with_sample_time(object.sample_time);
            (object.input_callback, time_stamp)
        };
        let Some(callback) = callback else {
            return NO_ERR;
        };
        let mut action_flags = 0;
        // SAFETY: registered through `set_input_callback`
        unsafe {
            (callback.proc_)(
                callback.user_data as *mut c_void,
                &mut action_flags,
                &time_stamp,
                bus,
                frames,
                ptr::null_mut(),
            )
        }
    }

    /// Finish playing the oldest enqueued buffer and report it. Returns
    /// `false` if nothing was enqueued.
    pub fn complete_next(&self, queue: NativeId) -> bool {
        let (callback, header) = {
            let mut state = self.state.lock();
            let Ok(object) = state.queue(queue) else {
                return false;
            };
            let Some(header) = object.pending.pop_front() else {
                return false;
            };
            (object.output_callback, header)
        };
        if let Some((proc_, user_data)) = callback {
            // SAFETY: bound at create; the buffer stays allocated until the
            // queue frees it
            unsafe {
                proc_(
                    user_data as *mut c_void,
                    queue.as_ptr::<c_void>(),
                    header as *mut AudioQueueBuffer,
                )
            };
        }
        true
    }

    /// Report a property change without changing the property.
    pub fn notify_property(&self, id: NativeId, address: PropertyAddress) {
        let notifications: Vec<_> = {
            let mut state = self.state.lock();
            let Ok(object) = state.any(id) else {
                return;
            };
            object
                .listeners_for(address.id)
                .map(|listener| Notification {
                    listener,
                    object: id.as_raw(),
                    address,
                })
                .collect()
        };
        notifications.into_iter().for_each(Notification::fire);
    }

    /// Bytes last enqueued in a queue buffer.
    pub fn buffer_byte_size(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> Option<u32> {
        let state = self.state.lock();
        let object = state.objects.get(&queue.as_raw())?;
        object
            .buffers
            .iter()
            .find(|b| b.header == buffer as usize)
            .map(SoftBuffer::byte_size)
    }

    unsafe fn pull(
        &self,
        unit: NativeId,
        action_flags: *mut u32,
        time_stamp: Option<&AudioTimeStamp>,
        bus: u32,
        frames: u32,
        io_data: *mut AudioBufferList,
    ) -> OsStatus {
        let (callback, level, own_time) = {
            let mut state = self.state.lock();
            let Ok(object) = state.any(unit) else {
                return codes::HARDWARE_BAD_OBJECT;
            };
            if !matches!(object.kind, ResourceKind::Unit | ResourceKind::ComponentInstance) {
                return codes::HARDWARE_BAD_OBJECT;
            }
            if frames > MAX_FRAMES_PER_SLICE {
                return codes::TOO_MANY_FRAMES_TO_PROCESS;
            }
            let own_time = AudioTimeStamp::with_sample_time(object.sample_time);
            object.sample_time += f64::from(frames);
            (
                object.render_callbacks.get(&bus).copied(),
                object.input_level,
                own_time,
            )
        };
        let time_stamp = time_stamp.unwrap_or(&own_time);

        if let Some(callback) = callback {
            return (callback.proc_)(
                callback.user_data as *mut c_void,
                action_flags,
                time_stamp,
                bus,
                frames,
                io_data,
            );
        }

        let mut scratch = BufferScratch::with_capacity(crate::config::config().max_buffers);
        if buffers::decode_into(io_data, &mut scratch).is_err() {
            return codes::PARAM_ERR;
        }
        for descriptor in scratch.as_slice() {
            match (level, descriptor.as_f32_mut()) {
                (Some(level), Some(samples)) => samples.fill(level),
                _ => descriptor.zero(),
            }
        }
        if level.is_none() && !action_flags.is_null() {
            *action_flags |= RENDER_ACTION_OUTPUT_IS_SILENCE;
        }
        NO_ERR
    }
}

impl Default for SoftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SoftEngine {
    fn drop(&mut self) {
        for object in self.state.get_mut().objects.values_mut() {
            object.buffers.drain(..).for_each(SoftBuffer::free);
        }
    }
}

impl std::fmt::Debug for SoftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SoftEngine")
            .field("objects", &state.objects.len())
            .field("calls", &state.calls.values().sum::<usize>())
            .finish()
    }
}

fn unit_object(kind: ResourceKind) -> SoftObject {
    let mut object = SoftObject::new(kind);
    let format = StreamFormat::float32_non_interleaved(DEFAULT_SAMPLE_RATE, 2);
    object.put(PropertyAddress::new(ids::STREAM_FORMAT, Scope::Input, 0), format);
    object.put(PropertyAddress::new(ids::STREAM_FORMAT, Scope::Output, 0), format);
    object.put(
        PropertyAddress::new(ids::SAMPLE_RATE, Scope::Output, 0),
        DEFAULT_SAMPLE_RATE,
    );
    object.put(
        PropertyAddress::global(ids::MAXIMUM_FRAMES_PER_SLICE),
        MAX_FRAMES_PER_SLICE,
    );
    object.put_read_only(PropertyAddress::global(ids::LATENCY), 0.0f64);
    object.put_read_only(PropertyAddress::global(ids::IS_RUNNING), 0u32);
    object
}

/// Flip the running flag and queue notifications for the matching
/// "is running" property.
fn set_running(object: &mut SoftObject, id: usize, running: bool) -> Vec<Notification> {
    if object.running == running {
        return Vec::new();
    }
    object.running = running;
    let property_id = match object.kind {
        ResourceKind::Queue => ids::QUEUE_IS_RUNNING,
        ResourceKind::Unit | ResourceKind::ComponentInstance => ids::IS_RUNNING,
        _ => return Vec::new(),
    };
    let address = PropertyAddress::global(property_id);
    object.put(address, u32::from(running));
    object
        .listeners_for(property_id)
        .map(|listener| Notification {
            listener,
            object: id,
            address,
        })
        .collect()
}

impl Engine for SoftEngine {
    fn name(&self) -> &'static str {
        "soft"
    }

    fn create(&self, args: &CreateArgs<'_>, user_data: *mut c_void, out: &mut NativeId) -> OsStatus {
        self.run(SoftCall::Create, |state| {
            let object = match *args {
                CreateArgs::Graph => SoftObject::new(ResourceKind::Graph),
                CreateArgs::Unit(description) | CreateArgs::ComponentInstance(description) => {
                    if description.component_type().is_none() {
                        return Err(codes::PARAM_ERR);
                    }
                    unit_object(args.kind())
                }
                CreateArgs::OutputQueue { format, callback } => {
                    let mut object = SoftObject::new(ResourceKind::Queue);
                    object.output_callback = Some((callback, user_data as usize));
                    object.put(PropertyAddress::global(ids::QUEUE_STREAM_DESCRIPTION), format);
                    object.put_read_only(PropertyAddress::global(ids::QUEUE_IS_RUNNING), 0u32);
                    object
                }
                CreateArgs::File { path } => {
                    let file = *state.files.get(path).ok_or(codes::FILE_NOT_FOUND)?;
                    let mut object = SoftObject::new(ResourceKind::File);
                    let frames = file.packet_count as f64 * f64::from(file.format.frames_per_packet);
                    let duration = if file.format.sample_rate > 0.0 {
                        frames / file.format.sample_rate
                    } else {
                        0.0
                    };
                    object.put_read_only(PropertyAddress::global(ids::FILE_DATA_FORMAT), file.format);
                    object.put_read_only(
                        PropertyAddress::global(ids::FILE_AUDIO_DATA_PACKET_COUNT),
                        file.packet_count,
                    );
                    object.put_read_only(
                        PropertyAddress::global(ids::FILE_ESTIMATED_DURATION),
                        duration,
                    );
                    object
                }
            };
            let id = state.next_id;
            state.next_id += 0x10;
            state.objects.insert(id, object);
            *out = NativeId::from_raw(id);
            Ok(Vec::new())
        })
    }

    fn dispose(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Dispose, |state| {
            state.object(target)?;
            if let Some(mut object) = state.objects.remove(&target.id.as_raw()) {
                object.buffers.drain(..).for_each(SoftBuffer::free);
            }
            Ok(Vec::new())
        })
    }

    fn open(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Open, |state| {
            state.object(target)?.opened = true;
            Ok(Vec::new())
        })
    }

    fn close(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Close, |state| {
            let object = state.object(target)?;
            let notifications = set_running(object, target.id.as_raw(), false);
            object.initialized = false;
            object.opened = false;
            Ok(notifications)
        })
    }

    fn initialize(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Initialize, |state| {
            let object = state.object(target)?;
            if object.kind == ResourceKind::File {
                return Err(codes::UNIMPLEMENTED);
            }
            if !object.opened {
                return Err(codes::HARDWARE_ILLEGAL_OPERATION);
            }
            if object.initialized {
                return Err(codes::INITIALIZED);
            }
            object.initialized = true;
            Ok(Vec::new())
        })
    }

    fn uninitialize(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Uninitialize, |state| {
            let object = state.object(target)?;
            let notifications = set_running(object, target.id.as_raw(), false);
            object.initialized = false;
            Ok(notifications)
        })
    }

    fn start(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Start, |state| {
            let object = state.object(target)?;
            match object.kind {
                ResourceKind::File => return Err(codes::UNIMPLEMENTED),
                ResourceKind::Queue => {}
                _ if !object.initialized => return Err(codes::UNINITIALIZED),
                _ => {}
            }
            Ok(set_running(object, target.id.as_raw(), true))
        })
    }

    fn stop(&self, target: Target) -> OsStatus {
        self.run(SoftCall::Stop, |state| {
            let object = state.object(target)?;
            if object.kind == ResourceKind::File {
                return Err(codes::UNIMPLEMENTED);
            }
            Ok(set_running(object, target.id.as_raw(), false))
        })
    }

    fn add_node(
        &self,
        graph: NativeId,
        description: &ComponentDescription,
        out: &mut NodeId,
    ) -> OsStatus {
        self.run(SoftCall::AddNode, |state| {
            let graph = state.graph(graph)?;
            if ComponentType::from_u32(description.component_type).is_none() {
                return Err(codes::GRAPH_INVALID_AUDIO_UNIT);
            }
            if description.is_output() && graph.has_output_node() {
                return Err(codes::GRAPH_OUTPUT_NODE_ERR);
            }
            let node = graph.next_node;
            graph.next_node += 1;
            graph.nodes.insert(node, *description);
            *out = node;
            Ok(Vec::new())
        })
    }

    fn remove_node(&self, graph: NativeId, node: NodeId) -> OsStatus {
        self.run(SoftCall::RemoveNode, |state| {
            let graph = state.graph(graph)?;
            graph
                .nodes
                .remove(&node)
                .ok_or(codes::GRAPH_NODE_NOT_FOUND)?;
            graph
                .connections
                .retain(|&(dest, _), &mut (source, _)| dest != node && source != node);
            Ok(Vec::new())
        })
    }

    fn connect(
        &self,
        graph: NativeId,
        source: NodeId,
        source_output: u32,
        dest: NodeId,
        dest_input: u32,
    ) -> OsStatus {
        self.run(SoftCall::Connect, |state| {
            let graph = state.graph(graph)?;
            if !graph.nodes.contains_key(&source) || !graph.nodes.contains_key(&dest) {
                return Err(codes::GRAPH_NODE_NOT_FOUND);
            }
            if source == dest {
                return Err(codes::GRAPH_INVALID_CONNECTION);
            }
            graph
                .connections
                .insert((dest, dest_input), (source, source_output));
            Ok(Vec::new())
        })
    }

    fn disconnect(&self, graph: NativeId, dest: NodeId, dest_input: u32) -> OsStatus {
        self.run(SoftCall::Disconnect, |state| {
            let graph = state.graph(graph)?;
            if !graph.nodes.contains_key(&dest) {
                return Err(codes::GRAPH_NODE_NOT_FOUND);
            }
            graph.connections.remove(&(dest, dest_input));
            Ok(Vec::new())
        })
    }

    fn property_info(
        &self,
        target: Target,
        address: PropertyAddress,
        size: &mut u32,
        writable: &mut bool,
    ) -> OsStatus {
        self.run(SoftCall::PropertyInfo, |state| {
            let object = state.object(target)?;
            let value = object
                .properties
                .get(&(address.id, address.scope, address.element))
                .ok_or(codes::INVALID_PROPERTY)?;
            *size = value.len() as u32;
            *writable = !object.read_only.contains(&address.id);
            Ok(Vec::new())
        })
    }

    unsafe fn get_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *mut c_void,
        size: &mut u32,
    ) -> OsStatus {
        self.run(SoftCall::GetProperty, |state| {
            let object = state.object(target)?;
            let value = object
                .properties
                .get(&(address.id, address.scope, address.element))
                .ok_or(codes::INVALID_PROPERTY)?;
            if (*size as usize) < value.len() || data.is_null() {
                return Err(codes::PARAM_ERR);
            }
            ptr::copy_nonoverlapping(value.as_ptr(), data.cast::<u8>(), value.len());
            *size = value.len() as u32;
            Ok(Vec::new())
        })
    }

    unsafe fn set_property(
        &self,
        target: Target,
        address: PropertyAddress,
        data: *const c_void,
        size: u32,
    ) -> OsStatus {
        self.run(SoftCall::SetProperty, |state| {
            let object = state.object(target)?;
            if object.read_only.contains(&address.id) {
                return Err(codes::PROPERTY_NOT_WRITABLE);
            }
            if data.is_null() {
                return Err(codes::PARAM_ERR);
            }
            let key = (address.id, address.scope, address.element);
            if object
                .properties
                .get(&key)
                .is_some_and(|v| v.len() != size as usize)
            {
                return Err(codes::INVALID_PROPERTY_VALUE);
            }
            let bytes = std::slice::from_raw_parts(data.cast::<u8>(), size as usize);
            object.properties.insert(key, bytes.to_vec());
            Ok(object
                .listeners_for(address.id)
                .map(|listener| Notification {
                    listener,
                    object: target.id.as_raw(),
                    address,
                })
                .collect())
        })
    }

    fn add_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.run(SoftCall::AddPropertyListener, |state| {
            state.object(target)?.listeners.push(Listener {
                property_id,
                proc_: listener,
                user_data: user_data as usize,
            });
            Ok(Vec::new())
        })
    }

    fn remove_property_listener(
        &self,
        target: Target,
        property_id: u32,
        listener: PropertyListenerFn,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.run(SoftCall::RemovePropertyListener, |state| {
            let object = state.object(target)?;
            let position = object.listeners.iter().position(|l| {
                l.property_id == property_id
                    && l.proc_ as usize == listener as usize
                    && l.user_data == user_data as usize
            });
            if let Some(position) = position {
                object.listeners.remove(position);
            }
            Ok(Vec::new())
        })
    }

    fn set_render_callback(
        &self,
        target: Target,
        element: u32,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.run(SoftCall::SetRenderCallback, |state| {
            let object = state.object(target)?;
            match callback {
                Some(proc_) => {
                    object.render_callbacks.insert(
                        element,
                        Callback {
                            proc_,
                            user_data: user_data as usize,
                        },
                    );
                }
                None => {
                    object.render_callbacks.remove(&element);
                }
            }
            Ok(Vec::new())
        })
    }

    fn set_input_callback(
        &self,
        target: Target,
        callback: Option<RenderCallbackFn>,
        user_data: *mut c_void,
    ) -> OsStatus {
        self.run(SoftCall::SetInputCallback, |state| {
            let object = state.object(target)?;
            object.input_callback = callback.map(|proc_| Callback {
                proc_,
                user_data: user_data as usize,
            });
            Ok(Vec::new())
        })
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
        if let Err(code) = self.begin(SoftCall::Render) {
            return code;
        }
        self.pull(target.id, action_flags, Some(time_stamp), bus, frames, io_data)
    }

    fn allocate_buffer(
        &self,
        queue: NativeId,
        capacity: u32,
        out: &mut *mut AudioQueueBuffer,
    ) -> OsStatus {
        self.run(SoftCall::AllocateBuffer, |state| {
            let queue = state.queue(queue)?;
            let buffer = SoftBuffer::allocate(capacity);
            *out = buffer.header as *mut AudioQueueBuffer;
            queue.buffers.push(buffer);
            Ok(Vec::new())
        })
    }

    fn free_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus {
        self.run(SoftCall::FreeBuffer, |state| {
            let queue = state.queue(queue)?;
            let index = queue
                .buffer_index(buffer as usize)
                .ok_or(codes::QUEUE_INVALID_BUFFER)?;
            if queue.pending.contains(&(buffer as usize)) {
                return Err(codes::QUEUE_BUFFER_IN_QUEUE);
            }
            queue.buffers.swap_remove(index).free();
            Ok(Vec::new())
        })
    }

    fn enqueue_buffer(&self, queue: NativeId, buffer: *mut AudioQueueBuffer) -> OsStatus {
        self.run(SoftCall::EnqueueBuffer, |state| {
            let queue = state.queue(queue)?;
            let index = queue
                .buffer_index(buffer as usize)
                .ok_or(codes::QUEUE_INVALID_BUFFER)?;
            if queue.pending.contains(&(buffer as usize)) {
                return Err(codes::QUEUE_BUFFER_IN_QUEUE);
            }
            if queue.buffers[index].byte_size() == 0 {
                return Err(codes::QUEUE_BUFFER_EMPTY);
            }
            queue.pending.push_back(buffer as usize);
            Ok(Vec::new())
        })
    }
}
