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

//! SSH-backed [`Connector`] and [`Transport`].

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use super::error::{ConnectError, ExecError};
use super::target::ConnectTarget;
use super::transport::{CommandOutput, Connector, Credential, ProgressFn, RemoteMetadata, Transport};
use crate::ssh::tokio_client::{self, AuthMethod, Client, ServerCheckMethod};

/// Default SFTP copy chunk size (32 KiB, the usual SFTP packet payload).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Opens SSH connections.
#[derive(Debug, Clone)]
pub struct SshConnector {
    server_check: ServerCheckMethod,
    keepalive_interval: Option<Duration>,
    chunk_size: usize,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(ServerCheckMethod::DefaultKnownHostsFile)
    }
}

impl SshConnector {
    pub fn new(server_check: ServerCheckMethod) -> Self {
        Self {
            server_check,
            keepalive_interval: Some(Duration::from_secs(60)),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Keepalive interval; `None` disables keepalives.
    pub fn with_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn auth_method(credential: Credential) -> AuthMethod {
        match credential {
            Credential::Password(password) => AuthMethod::Password(password),
            Credential::KeyFile { path, passphrase } => AuthMethod::PrivateKeyFile {
                key_file_path: path,
                key_pass: passphrase,
            },
            #[cfg(not(target_os = "windows"))]
            Credential::Agent => AuthMethod::Agent,
            #[cfg(target_os = "windows")]
            Credential::Agent => AuthMethod::with_password(""),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
        credential: Credential,
    ) -> Result<Arc<dyn Transport>, ConnectError> {
        let config = tokio_client::Config {
            keepalive_interval: self.keepalive_interval,
            keepalive_max: 3,
            ..Default::default()
        };

        tracing::debug!("Connecting to {}", target);
        let client = Client::connect_with_config(
            (target.host.as_str(), target.port),
            &target.user,
            Self::auth_method(credential),
            self.server_check.clone(),
            config,
        )
        .await
        .map_err(|e| {
            tracing::debug!("Connection to {} failed: {}", target, e);
            ConnectError::classify(&e)
        })?;

        tracing::info!("Connected to {}", target);
        Ok(Arc::new(SshTransport {
            client,
            chunk_size: self.chunk_size,
        }))
    }
}

/// [`Transport`] over one russh connection.
#[derive(Debug)]
pub struct SshTransport {
    client: Client,
    chunk_size: usize,
}

impl SshTransport {
    fn map_err(&self, err: tokio_client::Error) -> ExecError {
        ExecError::from_client(err, self.client.is_closed())
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn remote_address(&self) -> String {
        self.client.get_connection_address().to_string()
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn exec_stream(
        &self,
        command: &str,
        sender: Sender<CommandOutput>,
        cancel: CancellationToken,
    ) -> Result<u32, ExecError> {
        self.client
            .execute_streaming(command, sender, cancel)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn stat(&self, remote_path: &str) -> Result<RemoteMetadata, ExecError> {
        self.client
            .remote_metadata(remote_path)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        self.client
            .upload_file_with_progress(local_path, remote_path, self.chunk_size, progress, cancel)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        self.client
            .download_file_with_progress(remote_path, local_path, self.chunk_size, progress, cancel)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        self.client.disconnect().await.map_err(|e| self.map_err(e))
    }
}
