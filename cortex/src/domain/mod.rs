// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer for the knowledge cortex
//!
//! Graph and vector value types, the closed update model, configuration and
//! domain events. Nothing here performs I/O.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types shared by every store and service

pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod pattern;
pub mod update;
pub mod vector;

pub use config::*;
pub use error::*;
pub use events::*;
pub use graph::*;
pub use pattern::*;
pub use update::*;
pub use vector::*;
