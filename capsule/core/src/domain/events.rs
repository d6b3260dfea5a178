// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::capsule::{CapsuleId, InstanceIdentity};
use crate::domain::provisioning::StrategyKind;

/// Capsule lifecycle events
///
/// Published on the event bus for observers; nothing in the engine consumes
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CapsuleEvent {
    CapsuleProvisioned {
        capsule_id: CapsuleId,
        identity: InstanceIdentity,
        capsule_path: String,
        strategy: StrategyKind,
        provisioned_at: DateTime<Utc>,
    },
    CapsuleProvisioningFailed {
        capsule_id: CapsuleId,
        identity: InstanceIdentity,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    CapsuleTornDown {
        capsule_id: CapsuleId,
        capsule_path: String,
        torn_down_at: DateTime<Utc>,
    },
    CapsuleTeardownFailed {
        capsule_id: CapsuleId,
        capsule_path: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    CommandExecuted {
        capsule_id: CapsuleId,
        command: String,
        exit_code: i32,
        duration_ms: u64,
        executed_at: DateTime<Utc>,
    },
}

impl CapsuleEvent {
    pub fn capsule_id(&self) -> &CapsuleId {
        match self {
            Self::CapsuleProvisioned { capsule_id, .. }
            | Self::CapsuleProvisioningFailed { capsule_id, .. }
            | Self::CapsuleTornDown { capsule_id, .. }
            | Self::CapsuleTeardownFailed { capsule_id, .. }
            | Self::CommandExecuted { capsule_id, .. } => capsule_id,
        }
    }
}
