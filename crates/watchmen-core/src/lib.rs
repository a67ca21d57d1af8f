//! # watchmen-core
//!
//! Shared definitions for the watchmen supervisor: the task model, the
//! JSON request/response protocol spoken by every transport, and the
//! daemon configuration file.

pub mod config;
pub mod protocol;
pub mod types;

pub use protocol::{Command, Data, Request, Response};
pub use types::*;
