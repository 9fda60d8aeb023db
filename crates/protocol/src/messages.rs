//! Viewer protocol message definitions for Termplex.
//!
//! Events cross the transport as JSON with a lowercase `type` tag. Binary
//! terminal data is base64-encoded on the wire; the daemon core works with
//! raw bytes and only touches base64 at this boundary.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Events sent by a viewer to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    /// Terminal input (keystrokes), base64-encoded.
    Input {
        /// Base64-encoded input bytes.
        data: String,
    },
    /// Terminal geometry change.
    Resize {
        /// New terminal rows.
        rows: u16,
        /// New terminal columns.
        cols: u16,
    },
    /// Request a fresh shell for the current workspace.
    Reset,
}

/// Events sent by the daemon to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// A chunk of terminal output, base64-encoded.
    Output {
        /// Base64-encoded output bytes.
        data: String,
    },
    /// Instructs the viewer to wipe its local terminal state.
    ///
    /// Sent only when a viewer switches workspaces and is about to replay
    /// the new workspace's scrollback; the daemon core never initiates it.
    Clear,
}

impl ClientEvent {
    /// Builds an input event from raw bytes.
    pub fn input(data: &[u8]) -> Self {
        ClientEvent::Input {
            data: BASE64.encode(data),
        }
    }

    /// Parses an event from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes the input payload to raw bytes.
    ///
    /// Returns `None` for events without a data payload.
    pub fn decode_data(&self) -> Result<Option<Vec<u8>>> {
        match self {
            ClientEvent::Input { data } => Ok(Some(BASE64.decode(data)?)),
            _ => Ok(None),
        }
    }
}

impl ServerEvent {
    /// Builds an output event from raw bytes.
    pub fn output(data: &[u8]) -> Self {
        ServerEvent::Output {
            data: BASE64.encode(data),
        }
    }

    /// Parses an event from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes the output payload to raw bytes.
    ///
    /// Returns `None` for events without a data payload.
    pub fn decode_data(&self) -> Result<Option<Vec<u8>>> {
        match self {
            ServerEvent::Output { data } => Ok(Some(BASE64.decode(data)?)),
            ServerEvent::Clear => Ok(None),
        }
    }
}
