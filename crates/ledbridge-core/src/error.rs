// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the state and encoding layer

use crate::profile::Slot;

/// An inbound desired-state message that could not be understood.
///
/// The message is dropped as a whole; the store is never touched.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Payload is not valid JSON or a field has the wrong type
    #[error("malformed state message: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object
    #[error("state message must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A frame table that cannot drive a controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("{frame} template is empty")]
    EmptyTemplate { frame: &'static str },

    #[error("{frame} template has an odd number of hex digits")]
    OddHexDigits { frame: &'static str },

    #[error("{frame} template contains invalid hex '{text}'")]
    InvalidHex { frame: &'static str, text: String },

    #[error("{frame} template has an unterminated slot")]
    UnterminatedSlot { frame: &'static str },

    #[error("{frame} template uses unknown slot '{{{name}}}'")]
    UnknownSlot { frame: &'static str, name: String },

    #[error("{frame} template must not contain the {slot} slot")]
    UnexpectedSlot { frame: &'static str, slot: Slot },

    #[error("{frame} template is missing the {slot} slot")]
    MissingSlot { frame: &'static str, slot: Slot },

    #[error("no template carries the brightness slot")]
    MissingBrightnessSlot,

    #[error("{frame} template must start and end with literal bytes")]
    UnframedTemplate { frame: &'static str },

    #[error(
        "{frame} template framing {found_marker:02x}..{found_trailer:02x} differs from \
         {marker:02x}..{trailer:02x}"
    )]
    InconsistentFraming {
        frame: &'static str,
        marker: u8,
        trailer: u8,
        found_marker: u8,
        found_trailer: u8,
    },

    #[error("brightness range {min}-{max} is invalid (need 1 <= min <= max <= 255)")]
    InvalidBrightnessRange { min: u8, max: u8 },

    #[error("unknown device profile '{0}'")]
    UnknownProfile(String),
}

/// Failure reading or writing the desired-state snapshot
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not a valid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
