//! Bridge configuration and component identification.
//!
//! [`BridgeConfig`] sizes the process-wide tables the bridge allocates up
//! front. It is installed at most once, before the first resource is
//! created; if nothing is installed, [`BridgeConfig::DEFAULT`] applies.
//!
//! # Example
//!
//! ```ignore
//! use aqueduct::core::config::{self, BridgeConfig};
//!
//! config::install(BridgeConfig::new().with_token_capacity(256))?;
//! ```

use std::sync::OnceLock;

use aqueduct_utils::FourCharCode;

use crate::error::{Error, Reason, Result};

/// Process-wide bridge limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Number of simultaneously live context tokens.
    pub token_capacity: usize,

    /// Largest buffer count accepted when decoding a buffer list. Render
    /// scratch is pre-allocated to this size.
    pub max_buffers: usize,
}

impl BridgeConfig {
    pub const DEFAULT: Self = Self::new();

    pub const fn new() -> Self {
        Self {
            token_capacity: 1024,
            max_buffers: 64,
        }
    }

    /// Set the token table capacity.
    pub const fn with_token_capacity(mut self, capacity: usize) -> Self {
        self.token_capacity = capacity;
        self
    }

    /// Set the maximum buffer count per buffer list.
    pub const fn with_max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = max_buffers;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static BRIDGE_CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// Fails with `Fatal(AlreadyConfigured)` if a configuration was already
/// installed or the defaults were already latched by first use.
pub fn install(config: BridgeConfig) -> Result<()> {
    if config.token_capacity == 0 || config.max_buffers == 0 {
        return Err(Error::Fatal(Reason::InvalidParameter));
    }
    BRIDGE_CONFIG
        .set(config)
        .map_err(|_| Error::Fatal(Reason::AlreadyConfigured))?;
    log::debug!(
        "bridge configured: {} tokens, {} buffers per list",
        config.token_capacity,
        config.max_buffers
    );
    Ok(())
}

/// The active configuration. Latches the defaults on first call.
pub fn config() -> &'static BridgeConfig {
    BRIDGE_CONFIG.get_or_init(BridgeConfig::new)
}

/// Component type (4-character code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// `auou`
    Output,
    /// `aumu`
    MusicDevice,
    /// `aumf`
    MusicEffect,
    /// `aufc`
    FormatConverter,
    /// `aufx`
    Effect,
    /// `aumx`
    Mixer,
    /// `aupn`
    Panner,
    /// `augn`
    Generator,
    /// `auol`
    OfflineEffect,
    /// `aumi`
    MidiProcessor,
}

impl ComponentType {
    pub const ALL: [Self; 10] = [
        Self::Output,
        Self::MusicDevice,
        Self::MusicEffect,
        Self::FormatConverter,
        Self::Effect,
        Self::Mixer,
        Self::Panner,
        Self::Generator,
        Self::OfflineEffect,
        Self::MidiProcessor,
    ];

    pub const fn code(&self) -> FourCharCode {
        FourCharCode::new(match self {
            Self::Output => b"auou",
            Self::MusicDevice => b"aumu",
            Self::MusicEffect => b"aumf",
            Self::FormatConverter => b"aufc",
            Self::Effect => b"aufx",
            Self::Mixer => b"aumx",
            Self::Panner => b"aupn",
            Self::Generator => b"augn",
            Self::OfflineEffect => b"auol",
            Self::MidiProcessor => b"aumi",
        })
    }

    /// Get the component type as a 32-bit FourCC value (big-endian).
    pub const fn as_u32(&self) -> u32 {
        self.code().as_u32()
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_u32() == value)
    }
}

/// Identifies a component to instantiate (`AudioComponentDescription`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentDescription {
    pub component_type: u32,
    pub component_sub_type: u32,
    pub component_manufacturer: u32,
    pub component_flags: u32,
    pub component_flags_mask: u32,
}

impl ComponentDescription {
    /// Apple's default output unit.
    pub const DEFAULT_OUTPUT: Self =
        Self::new(ComponentType::Output, b"def ", b"appl");

    /// Apple's generic output unit (no device).
    pub const GENERIC_OUTPUT: Self =
        Self::new(ComponentType::Output, b"genr", b"appl");

    pub const MULTICHANNEL_MIXER: Self =
        Self::new(ComponentType::Mixer, b"mcmx", b"appl");

    pub const fn new(ty: ComponentType, sub_type: &[u8; 4], manufacturer: &[u8; 4]) -> Self {
        Self {
            component_type: ty.as_u32(),
            component_sub_type: FourCharCode::new(sub_type).as_u32(),
            component_manufacturer: FourCharCode::new(manufacturer).as_u32(),
            component_flags: 0,
            component_flags_mask: 0,
        }
    }

    pub fn component_type(&self) -> Option<ComponentType> {
        ComponentType::from_u32(self.component_type)
    }

    /// Output units drive a graph; at most one per graph.
    pub const fn is_output(&self) -> bool {
        self.component_type == ComponentType::Output.as_u32()
    }
}
