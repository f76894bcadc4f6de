//! # Heron Inspector
//!
//! Debugging boundary for the Heron script engine: a JSON schema modeled on
//! the Chrome DevTools `Debugger` and `Runtime` domains, a [`DebugSession`]
//! that owns breakpoints and pause state for registered programs, and an
//! [`InspectorServer`] that serves the session over HTTP.
//!
//! The transport is request/response only. Events raised by the session are
//! queued and fetched by the client with `Inspector.drainEvents`.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{InspectorError, InspectorResult, ProtocolError};
pub use server::{InspectorConfig, InspectorServer};
pub use session::{DebugSession, DetachedHost, ExecutionPoint, RuntimeHost, SharedSession};
