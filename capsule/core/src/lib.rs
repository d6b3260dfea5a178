// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # `instance-capsule-core`: Instance Capsule Lifecycle Engine
//!
//! Builds, manages and tears down an isolated directory tree ("capsule") for a
//! single tenant application instance, and runs console commands inside it.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | identities, path resolution, config, errors, collaborator traits |
//! | [`application`] | Application | `Capsule` lifecycle handle, `CapsuleService`, keyed locks |
//! | [`infrastructure`] | Infrastructure | provisioning strategies, `.env` writer, shell runner, event bus |
//!
//! ## Lifecycle
//!
//! ```text
//! Unprovisioned ──up()──▶ Up ──down()/destroy()/drop──▶ Down ──up()──▶ Up
//! ```
//!
//! A failed `up()` purges whatever it created before returning the original
//! error. Dropping a self-destructing handle tears the capsule down.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{Capsule, CapsuleEngine, CapsuleLocks, CapsuleService, StandardCapsuleService};
pub use domain::*;
pub use infrastructure::{EventBus, InMemoryInstanceDirectory, RootedStorageLocator};
