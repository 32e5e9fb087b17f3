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

use anyhow::{Context, Result};
use std::fmt;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// The remote endpoint a session connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl ConnectTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    /// Parse `host`, `host:port`, `user@host` or `user@host:port`.
    ///
    /// Missing parts fall back to `default_user`/`default_port`, then to the
    /// current login name and port 22.
    pub fn parse(
        destination: &str,
        default_user: Option<&str>,
        default_port: Option<u16>,
    ) -> Result<Self> {
        let (user_part, host_part) = match destination.rsplit_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, destination),
        };

        let (host, port) = match host_part.rsplit_once(':') {
            Some((host, port_str)) if !host.contains(':') => {
                let port = port_str
                    .parse::<u16>()
                    .with_context(|| format!("Invalid port number in '{destination}'"))?;
                (host, port)
            }
            _ => (host_part, default_port.unwrap_or(DEFAULT_SSH_PORT)),
        };

        if host.is_empty() {
            anyhow::bail!("Missing host in destination '{destination}'");
        }

        let user = user_part
            .filter(|u| !u.is_empty())
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(current_username);

        Ok(Self::new(host, port, user))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
