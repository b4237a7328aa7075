//! Property addressing and typed payloads.
//!
//! Native properties are untyped blocks of bytes addressed by
//! `(id, scope, element)`. [`PropertyData`] marks the Rust types that may be
//! copied in and out of such a block.

use std::mem;

use aqueduct_utils::fourcc;

use crate::config::ComponentDescription;
use crate::engine::{AudioTimeStamp, SmpteTime};
use crate::format::StreamFormat;

/// Property identifiers understood by the bridge.
pub mod ids {
    use super::fourcc;

    // Audio units
    pub const SAMPLE_RATE: u32 = 2;
    pub const STREAM_FORMAT: u32 = 8;
    pub const ELEMENT_COUNT: u32 = 11;
    pub const LATENCY: u32 = 12;
    pub const MAXIMUM_FRAMES_PER_SLICE: u32 = 14;
    pub const TAIL_TIME: u32 = 20;
    pub const BYPASS_EFFECT: u32 = 21;
    pub const LAST_RENDER_ERROR: u32 = 22;
    pub const SET_RENDER_CALLBACK: u32 = 23;
    pub const CURRENT_DEVICE: u32 = 2000;
    pub const ENABLE_IO: u32 = 2003;
    pub const SET_INPUT_CALLBACK: u32 = 2005;
    pub const IS_RUNNING: u32 = 2011;

    // Audio queues
    pub const QUEUE_IS_RUNNING: u32 = fourcc(b"aqrn");
    pub const QUEUE_STREAM_DESCRIPTION: u32 = fourcc(b"aqft");

    // Audio files
    pub const FILE_DATA_FORMAT: u32 = fourcc(b"dfmt");
    pub const FILE_AUDIO_DATA_PACKET_COUNT: u32 = fourcc(b"pcnt");
    pub const FILE_ESTIMATED_DURATION: u32 = fourcc(b"edur");
}

/// Property scope.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global = 0,
    Input = 1,
    Output = 2,
}

impl Scope {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Fully qualified property location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub id: u32,
    pub scope: u32,
    pub element: u32,
}

impl PropertyAddress {
    pub const fn new(id: u32, scope: Scope, element: u32) -> Self {
        Self {
            id,
            scope: scope.as_u32(),
            element,
        }
    }

    pub const fn global(id: u32) -> Self {
        Self::new(id, Scope::Global, 0)
    }

    pub const fn input(id: u32, element: u32) -> Self {
        Self::new(id, Scope::Input, element)
    }

    pub const fn output(id: u32, element: u32) -> Self {
        Self::new(id, Scope::Output, element)
    }
}

/// Size and writability of a property, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    pub size: u32,
    pub writable: bool,
}

/// Plain data that can be copied to and from a native property block.
///
/// # Safety
///
/// Implementors must have a stable C layout (`#[repr(C)]`,
/// `#[repr(transparent)]` or a primitive) and every bit pattern of the
/// right size must be a valid value. Use `#[derive(PropertyData)]` for
/// structs.
pub unsafe trait PropertyData: Copy + 'static {
    /// Size of the native block.
    const SIZE: u32 = mem::size_of::<Self>() as u32;
}

macro_rules! impl_property_data {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: primitive with no invalid bit patterns
            unsafe impl PropertyData for $ty {}
        )*
    };
}

impl_property_data!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, usize, isize);

// SAFETY: arrays of plain data are plain data
unsafe impl<T: PropertyData, const N: usize> PropertyData for [T; N] {}

// SAFETY: #[repr(C)] structs of integer fields
unsafe impl PropertyData for ComponentDescription {}

// SAFETY: #[repr(C)], float and integer fields only
unsafe impl PropertyData for StreamFormat {}

// SAFETY: #[repr(C)], float and integer fields only
unsafe impl PropertyData for SmpteTime {}

// SAFETY: #[repr(C)], float and integer fields only
unsafe impl PropertyData for AudioTimeStamp {}
