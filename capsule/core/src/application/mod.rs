// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod capsule_service;
pub mod lifecycle;
pub mod locks;

pub use capsule_service::{CapsuleService, StandardCapsuleService};
pub use lifecycle::{Capsule, CapsuleEngine};
pub use locks::CapsuleLocks;
