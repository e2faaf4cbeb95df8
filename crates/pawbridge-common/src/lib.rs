//! Common utilities for pawbridge
//!
//! This crate provides the error type shared by every pawbridge crate.

pub mod error;

pub use error::{PetDataError, Result};
