// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain
//!
//! Value objects, policies and collaborator contracts of the capsule engine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules; no process spawning, minimal I/O

pub mod capsule;
pub mod capsule_config;
pub mod command;
pub mod environment;
pub mod error;
pub mod events;
pub mod instance;
pub mod path_resolver;
pub mod provisioning;
