//! # Aqueduct
//!
//! Callback, buffer and lifecycle bridge between a native real-time audio
//! engine and Rust.
//!
//! ## Architecture
//!
//! ```text
//! Your code (handlers, listeners)
//!        ↑ CallbackHub, resolved by ContextToken
//! extern "C" thunks
//!        ↑
//! Engine (SoftEngine / CoreAudioEngine)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aqueduct::prelude::*;
//!
//! let engine = Arc::new(SoftEngine::new());
//! let mut unit = AudioUnit::new(engine.clone(), ComponentDescription::DEFAULT_OUTPUT)?;
//! unit.set_render_handler(0, |context: &mut RenderContext<'_>| {
//!     for index in 0..context.buffer_count() {
//!         if let Some(samples) = context.channel_mut(index) {
//!             samples.fill(0.0);
//!         }
//!     }
//!     Ok(())
//! })?;
//! unit.initialize()?;
//! unit.start()?;
//! // ...
//! unit.teardown();
//! ```

// Lets the derive output name `::aqueduct` from inside this crate too.
extern crate self as aqueduct;

// Re-export sub-crates
pub use aqueduct_core as core;

// Re-export derive macros when feature is enabled
#[cfg(feature = "derive")]
pub use aqueduct_macros::PropertyData;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use aqueduct::prelude::*;
/// ```
pub mod prelude {
    pub use aqueduct_core::{
        // Resources
        AudioFile, AudioQueue, AudioUnit, Graph, ResourceHandle,
        // Engines
        Engine, SoftEngine,
        // Callbacks
        CallbackError, CallbackResult, InputContext, InputHandler, OutputCompletedHandler,
        OutputContext, PropertyEvent, PropertyListener, RenderContext, RenderHandler,
        // Descriptions and properties
        ComponentDescription, ComponentType, PropertyAddress, Scope, StreamFormat,
        // Buffers
        OwnedBufferList,
        // Lifecycle and errors
        Error, LifecycleState, Reason, Result,
    };

    pub use aqueduct_core::property::{ids, PropertyData};

    #[cfg(target_os = "macos")]
    pub use aqueduct_core::CoreAudioEngine;

    #[cfg(feature = "derive")]
    pub use aqueduct_macros::PropertyData;
}

#[cfg(all(test, feature = "derive"))]
mod tests {
    use std::sync::Arc;

    use crate::prelude::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, PropertyData)]
    struct ChannelRange {
        first: u32,
        count: u32,
    }

    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, PropertyData)]
    struct Gain(f64);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, PropertyData)]
    struct Layout {
        format: StreamFormat,
        channels: [ChannelRange; 2],
    }

    const CHANNEL_RANGE: u32 = 64_000;

    #[test]
    fn test_derived_sizes() {
        assert_eq!(<ChannelRange as PropertyData>::SIZE, 8);
        assert_eq!(<Gain as PropertyData>::SIZE, 8);
        assert_eq!(<Layout as PropertyData>::SIZE, 56);
    }

    #[test]
    fn test_derived_property_roundtrip() {
        let engine = Arc::new(SoftEngine::new());
        let mut unit = AudioUnit::new(engine, ComponentDescription::DEFAULT_OUTPUT).unwrap();
        let address = PropertyAddress::new(CHANNEL_RANGE, Scope::Output, 0);
        let range = ChannelRange { first: 2, count: 4 };

        unit.set_property(address, &range).unwrap();
        assert_eq!(unit.get_property::<ChannelRange>(address).unwrap(), range);
        assert_eq!(
            unit.get_property::<Layout>(address),
            Err(Error::Fatal(Reason::InvalidPropertySize))
        );

        let gain = PropertyAddress::global(CHANNEL_RANGE + 1);
        unit.set_property(gain, &Gain(0.5)).unwrap();
        assert_eq!(unit.get_property::<Gain>(gain).unwrap(), Gain(0.5));
        unit.teardown();
    }
}
