// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ledbridge-core
//!
//! The side-effect-free heart of the bridge: what the light *should* show,
//! and how that becomes bytes on the controller's write characteristic.
//!
//! ## Architecture
//!
//! ```text
//! inbound JSON ──► PartialState ──► StateStore ──► DesiredState
//!                                                      │
//!                               DeviceProfile ──► CommandEncoder
//!                                                      │
//!                                                      ▼
//!                                              Vec<CommandFrame>
//! ```
//!
//! Nothing in this crate performs network or Bluetooth I/O. The only
//! filesystem access is the optional state snapshot behind
//! [`StateStore::with_persistence`].
//!
//! ## Usage
//!
//! ```rust
//! use ledbridge_core::{CommandEncoder, DeviceProfile, PartialState, StateStore};
//!
//! let store = StateStore::default();
//! let encoder = CommandEncoder::new(DeviceProfile::elk_bledom());
//!
//! let update = PartialState::from_json(br#"{"brightness": 128}"#).unwrap();
//! let outcome = store.apply_update(&update);
//!
//! let frames = encoder.encode(&outcome.state, false);
//! assert_eq!(frames.len(), 2);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod encoder;
pub mod error;
pub mod persistence;
pub mod profile;
pub mod state;
pub mod store;

pub use encoder::{encode, CommandEncoder, CommandFrame, FrameKind};
pub use error::{MessageError, PersistenceError, ProfileError};
pub use persistence::StatePersistence;
pub use profile::{BrightnessRange, DeviceProfile, FrameTemplate, ProfileDefinition, Slot};
pub use state::{ColorUpdate, DesiredState, PartialState, PowerState, Rgb, UpdateOutcome};
pub use store::StateStore;
