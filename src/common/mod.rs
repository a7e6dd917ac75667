//! Shared error type and terminal logging.

pub mod error;
pub mod logging;
