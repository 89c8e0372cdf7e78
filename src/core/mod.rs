//! Core types shared across dc.
//!
//! Currently this is the error type and its user-facing presentation; see
//! [`error`] for details.

pub mod error;

pub use error::{DcError, ErrorContext, user_friendly_error};
