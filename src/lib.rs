// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One SSH connection serving command execution, live file tailing and
//! progress-tracked file transfers.
//!
//! The [`session::Session`] owns the connection. [`executor::CommandExecutor`],
//! [`tail::LiveTailController`] and [`transfer::TransferController`] share it
//! through an `Arc` and never touch the transport directly.

pub mod cli;
pub mod commands;
pub mod config;
pub mod executor;
pub mod session;
pub mod ssh;
pub mod tail;
pub mod transfer;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use executor::CommandExecutor;
pub use session::{ConnectTarget, Credential, Session};
pub use tail::LiveTailController;
pub use transfer::TransferController;
