// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ledbridge-observability
//!
//! Logging setup shared by the ledbridge crates, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: daily-rotated log files next to console output

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known ledbridge crate names for debug flags (also their log targets)
pub const KNOWN_CRATES: &[&str] = &[
    "ledbridge-core",
    "ledbridge-config",
    "ledbridge-agent",
    "ledbridge-ble",
    "ledbridge-mqtt",
];
