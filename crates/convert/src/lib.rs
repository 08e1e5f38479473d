//! Client for the external AI conversion capability.
//!
//! The engine never talks to the conversion service directly; it goes
//! through the narrow [`ConvertService`] trait defined here. The one real
//! implementation is [`HttpConvertClient`]; tests substitute scripted
//! stubs.

pub mod client;
pub mod service;

pub use client::{ConvertError, HttpConvertClient};
pub use service::{ConvertRequest, ConvertResponse, ConvertService, ConvertedFile};
