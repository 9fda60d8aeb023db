//! # Termplex Protocol Library
//!
//! This crate defines the viewer-facing event types for Termplex, the
//! workspace terminal session daemon.
//!
//! ## Overview
//!
//! Viewers talk to the daemon over a persistent duplex connection carrying
//! JSON events:
//!
//! - **Viewer → daemon**: `input` (base64 keystrokes), `resize`, `reset`
//! - **Daemon → viewer**: `output` (base64 terminal chunks), `clear`
//!
//! Binary payloads are base64-encoded only at this boundary; everything
//! inside the daemon is raw bytes.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ClientEvent, ServerEvent};
//!
//! let event = ClientEvent::input(b"ls\n");
//! let json = event.to_json().unwrap();
//!
//! let parsed = ClientEvent::from_json(&json).unwrap();
//! assert_eq!(parsed.decode_data().unwrap().unwrap(), b"ls\n");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Viewer event definitions and base64 helpers
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{ClientEvent, ServerEvent};
