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

//! The seam between the session and the wire.
//!
//! [`Connector`] opens a [`Transport`]; the session owns at most one
//! transport at a time and routes every operation class through it. The
//! production implementations live in [`super::ssh`]; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use super::error::{ConnectError, ExecError};
use super::target::ConnectTarget;
pub use crate::ssh::tokio_client::{CommandOutput, ProgressFn, RemoteMetadata};

/// How to prove identity to the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Password(Zeroizing<String>),
    KeyFile {
        path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
    Agent,
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Credential::Password(Zeroizing::new(password.into()))
    }

    pub fn key_file(path: impl AsRef<Path>, passphrase: Option<&str>) -> Self {
        Credential::KeyFile {
            path: path.as_ref().to_path_buf(),
            passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }
}

/// A live, authenticated connection.
///
/// Implementations must tolerate concurrent calls: each call uses its own
/// channel, and one call failing must not block another.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address the connection is established with, for display.
    fn remote_address(&self) -> String;

    /// True once the underlying connection is no longer usable.
    fn is_closed(&self) -> bool;

    /// Run `command`, forwarding output chunks in arrival order.
    ///
    /// Returns the exit status, or [`ExecError::Cancelled`] once `cancel`
    /// fires or the receiving side of `sender` is dropped.
    async fn exec_stream(
        &self,
        command: &str,
        sender: Sender<CommandOutput>,
        cancel: CancellationToken,
    ) -> Result<u32, ExecError>;

    /// Stat a remote path.
    async fn stat(&self, remote_path: &str) -> Result<RemoteMetadata, ExecError>;

    /// Copy a local file to the remote host.
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError>;

    /// Copy a remote file to the local host.
    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError>;

    /// Best-effort close.
    async fn disconnect(&self) -> Result<(), ExecError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectTarget,
        credential: Credential,
    ) -> Result<Arc<dyn Transport>, ConnectError>;
}
