// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod command_runner;
pub mod directory;
pub mod environment_writer;
pub mod event_bus;
pub mod provisioning;

pub use command_runner::ShellCommandRunner;
pub use directory::{InMemoryInstanceDirectory, RootedStorageLocator};
pub use environment_writer::EnvironmentWriter;
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use provisioning::{create_provisioning_strategy, prepare_storage, CopyStrategy, LinkStrategy};
