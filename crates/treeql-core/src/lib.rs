//! TreeQL Core Library
//!
//! This crate provides the value type and the error taxonomy shared by every
//! stage of the TreeQL pipeline.
//!
//! # Modules
//!
//! - `value` - Column and literal values (scalars, temporal types, lists)
//! - `error` - Error types and result aliases

pub mod error;
pub mod value;

pub use error::{Error, ErrorCategory, Result};
pub use value::{Decimal, Value};
