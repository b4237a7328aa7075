//! # aqueduct-core
//!
//! Callback, buffer and lifecycle bridge between a native real-time audio
//! engine and Rust.
//!
//! The bridge owns native audio objects through [`ResourceHandle`] and its
//! typed wrappers, routes engine callbacks back to Rust state through
//! stable [`ContextToken`]s, and classifies every native status code as
//! recoverable or fatal.
//!
//! ## Main Types
//!
//! - [`AudioUnit`] - A single unit with render and input callbacks
//! - [`Graph`] - Node/connection composition with an explicit lifecycle
//! - [`AudioQueue`] - Output queue with a buffer pool
//! - [`AudioFile`] - Read-only file metadata
//! - [`Engine`] - The native surface, implemented by [`SoftEngine`] and,
//!   on macOS, `CoreAudioEngine`
//!
//! ## Callbacks
//!
//! Render, input and buffer-completed handlers implement
//! [`RenderHandler`], [`InputHandler`] and [`OutputCompletedHandler`];
//! property listeners implement [`PropertyListener`]. A handler failure is
//! contained: the callback reports success to the engine, outputs silence
//! where applicable, and the failure is recorded in the owning handle's
//! [`CallbackDiagnostics`].

pub mod buffers;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod file;
pub mod format;
pub mod graph;
pub mod handle;
pub mod lifecycle;
pub mod listeners;
pub mod property;
pub mod queue;
pub mod soft;
pub mod status;
pub mod thunk;
pub mod unit;

#[cfg(target_os = "macos")]
pub mod coreaudio;

// Re-exports for convenience
pub use buffers::{BufferDescriptor, BufferList, OwnedBufferList};
pub use config::{install, BridgeConfig, ComponentDescription, ComponentType};
pub use context::{ContextTable, ContextToken};
pub use engine::{AudioTimeStamp, Engine, NativeId, NodeId, ResourceKind};
pub use error::{Error, Reason, Result};
pub use file::AudioFile;
pub use format::StreamFormat;
pub use graph::{Connection, Graph, GraphNode};
pub use handle::ResourceHandle;
pub use lifecycle::{LifecycleState, Operation};
pub use listeners::{PropertyEvent, PropertyListener, SubscriptionId};
pub use property::{PropertyAddress, PropertyData, PropertyInfo, Scope};
pub use queue::{AudioQueue, QueueBuffer};
pub use soft::{SoftCall, SoftEngine, VirtualFile};
pub use status::{translate, OsStatus, Outcome};
pub use unit::AudioUnit;
pub use thunk::{
    CallbackDiagnostics, CallbackError, CallbackFailure, CallbackKind, CallbackResult,
    InputContext, InputHandler, OutputCompletedHandler, OutputContext, RenderContext,
    RenderHandler,
};

#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioEngine;
