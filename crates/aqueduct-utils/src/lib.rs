//! Internal utilities for the Aqueduct audio engine bridge.
//!
//! This crate provides low-level helpers shared between `aqueduct-core` and
//! `aqueduct-macros`. Everything is `const fn` where possible and has zero
//! external dependencies.
//!
//! # Contents
//!
//! - [`FourCharCode`] - four-character codes used for component types,
//!   property selectors and some engine status codes
//! - [`CodeDisplay`] - formats an engine status code as `'abcd'` when it is a
//!   printable four-character code and as a decimal number otherwise

pub mod fourcc;

pub use fourcc::{fourcc, CodeDisplay, FourCharCode};
