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

//! Configuration type definitions.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionOptions;
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::tail::{TailCommands, TailTimings, DEFAULT_FOLLOW_COMMAND, DEFAULT_SNAPSHOT_COMMAND};
use crate::transfer::TransferOptions;
use crate::utils::expand_tilde;

/// Default connect deadline in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub tail: TailConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Connection defaults, overridden by command-line flags.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Private key file; `~` is expanded.
    pub identity: Option<String>,
    /// Seconds to wait for the connection. 0 disables the deadline.
    pub connect_timeout: Option<u64>,
    /// `yes`, `no`, or a known_hosts file path.
    pub strict_host_key_checking: Option<String>,
    /// SSH keepalive interval in seconds. 0 disables keepalives.
    pub keepalive_interval: Option<u64>,
}

impl Defaults {
    pub fn session_options(&self) -> SessionOptions {
        let seconds = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        SessionOptions {
            connect_timeout: (seconds > 0).then(|| Duration::from_secs(seconds)),
        }
    }

    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity
            .as_deref()
            .map(|identity| expand_tilde(std::path::Path::new(identity)))
    }

    pub fn keepalive(&self) -> Option<Duration> {
        match self.keepalive_interval {
            Some(0) => None,
            Some(seconds) => Some(Duration::from_secs(seconds)),
            None => Some(Duration::from_secs(60)),
        }
    }
}

/// Parse a host key checking mode: `yes`, `no`, or a known_hosts path.
pub fn parse_host_key_checking(mode: &str) -> Result<ServerCheckMethod> {
    match mode.trim() {
        "yes" | "true" => Ok(ServerCheckMethod::DefaultKnownHostsFile),
        "no" | "false" | "off" => Ok(ServerCheckMethod::NoCheck),
        "" => bail!("Empty host key checking mode"),
        path => Ok(ServerCheckMethod::with_known_hosts_file(
            &expand_tilde(std::path::Path::new(path)).to_string_lossy(),
        )),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TailConfig {
    pub debounce_ms: u64,
    pub stream_delay_ms: u64,
    pub flush_ms: u64,
    pub stop_grace_ms: u64,
    pub max_buffered_lines: usize,
    /// Window size used when none is given on the command line.
    pub default_lines: usize,
    pub snapshot_command: String,
    pub follow_command: String,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            stream_delay_ms: 1000,
            flush_ms: 50,
            stop_grace_ms: 300,
            max_buffered_lines: 1000,
            default_lines: 100,
            snapshot_command: DEFAULT_SNAPSHOT_COMMAND.to_string(),
            follow_command: DEFAULT_FOLLOW_COMMAND.to_string(),
        }
    }
}

impl TailConfig {
    pub fn timings(&self) -> TailTimings {
        TailTimings {
            debounce: Duration::from_millis(self.debounce_ms),
            stream_delay: Duration::from_millis(self.stream_delay_ms),
            flush_interval: Duration::from_millis(self.flush_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            max_buffered_lines: self.max_buffered_lines,
        }
    }

    pub fn commands(&self) -> TailCommands {
        TailCommands {
            snapshot: self.snapshot_command.clone(),
            follow: self.follow_command.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    pub progress_interval_ms: u64,
    pub rate_window_ms: u64,
    /// SFTP read/write size in bytes.
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 100,
            rate_window_ms: 2000,
            chunk_size: crate::session::ssh::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn options(&self) -> TransferOptions {
        TransferOptions {
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            rate_window: Duration::from_millis(self.rate_window_ms),
        }
    }
}

impl Config {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.tail.snapshot_command.contains("{path}") {
            bail!("tail.snapshot_command must contain {{path}}");
        }
        if !self.tail.follow_command.contains("{path}") {
            bail!("tail.follow_command must contain {{path}}");
        }
        if self.tail.max_buffered_lines == 0 {
            bail!("tail.max_buffered_lines must be at least 1");
        }
        if self.transfer.chunk_size == 0 {
            bail!("transfer.chunk_size must be at least 1");
        }
        if self.transfer.rate_window_ms == 0 {
            bail!("transfer.rate_window_ms must be at least 1");
        }
        Ok(())
    }
}
