//! esmweave Core Library
//!
//! This crate provides the identity types and error handling shared by the
//! record parsers and the load-order data layer.

pub mod error;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::types::*;
}
