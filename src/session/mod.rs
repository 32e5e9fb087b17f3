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

//! The single owned connection to a remote host.
//!
//! A [`Session`] holds at most one live [`Transport`] and exposes the
//! execution primitives every other component is built on:
//!
//! - [`Session::execute`]: run to completion, combined output
//! - [`Session::execute_split`]: run to completion, stdout and stderr apart
//! - [`Session::execute_chunks`]: run to completion, raw ordered chunks
//! - [`Session::execute_streaming`]: long-lived command, one callback per line
//! - [`Session::upload`] / [`Session::download`]: byte copies with progress
//!
//! Every primitive fails with [`ExecError::NotConnected`] before touching the
//! network when no live connection exists. A call that observes the
//! connection dying clears the handle, so later calls fail the same way.

pub mod error;
pub mod lines;
pub mod ssh;
pub mod target;
pub mod transport;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub use error::{ConnectError, ExecError};
pub use lines::LineSplitter;
pub use ssh::{SshConnector, SshTransport};
pub use target::ConnectTarget;
pub use transport::{CommandOutput, Connector, Credential, ProgressFn, RemoteMetadata, Transport};

/// Output chunks buffered between the wire and the collecting side.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Deadline for establishing a connection; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

/// Published on every connection state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { remote_address: String },
    Failed { message: String },
}

struct Live {
    transport: Arc<dyn Transport>,
    remote_address: String,
}

pub struct Session {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    live: RwLock<Option<Live>>,
    last_error: Mutex<Option<String>>,
    state_tx: watch::Sender<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    /// Bumped by every `disconnect`; an attempt that started under an older
    /// value must not install its handle.
    generation: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("remote_address", &self.remote_address())
            .finish()
    }
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>, options: SessionOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            options,
            live: RwLock::new(None),
            last_error: Mutex::new(None),
            state_tx,
            connect_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Establish the connection, replacing any existing one.
    pub async fn connect(
        &self,
        target: &ConnectTarget,
        credential: Credential,
    ) -> Result<(), ConnectError> {
        let _guard = self.connect_lock.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(previous) = self.take_live() {
            tracing::debug!("Replacing connection to {}", previous.remote_address);
            if let Err(e) = previous.transport.disconnect().await {
                tracing::debug!("Closing previous connection failed: {}", e);
            }
        }

        self.state_tx.send_replace(ConnectionState::Connecting);

        let attempt = self.connector.connect(target, credential);
        let result = match self.options.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout(format!(
                    "no response from {} within {}s",
                    target.address(),
                    limit.as_secs_f64()
                ))),
            },
            None => attempt.await,
        };

        match result {
            Ok(transport) => {
                let remote_address = transport.remote_address();
                let installed = {
                    let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
                    if self.generation.load(Ordering::SeqCst) == generation {
                        *live = Some(Live {
                            transport: transport.clone(),
                            remote_address: remote_address.clone(),
                        });
                        true
                    } else {
                        false
                    }
                };
                if !installed {
                    tracing::debug!("Disconnected while connecting to {}", target);
                    if let Err(e) = transport.disconnect().await {
                        tracing::debug!("Closing aborted connection failed: {}", e);
                    }
                    return Err(ConnectError::Aborted);
                }
                *self.last_error_slot() = None;
                tracing::info!("Session connected to {} ({})", target, remote_address);
                self.state_tx
                    .send_replace(ConnectionState::Connected { remote_address });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", target, e);
                self.record_error(e.to_string());
                self.state_tx.send_replace(ConnectionState::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Close the connection. Local state is cleared even if the close fails.
    ///
    /// An attempt still in flight is aborted and fails with
    /// [`ConnectError::Aborted`].
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.take_live();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        if let Some(previous) = previous {
            tracing::debug!("Disconnecting from {}", previous.remote_address);
            if let Err(e) = previous.transport.disconnect().await {
                tracing::debug!("Disconnect failed: {}", e);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|live| !live.transport.is_closed())
    }

    pub fn remote_address(&self) -> Option<String> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|live| live.remote_address.clone())
    }

    /// The most recent failure surfaced by this session.
    pub fn last_error(&self) -> Option<String> {
        self.last_error_slot().clone()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Run `command` and return stdout and stderr interleaved as received.
    pub async fn execute(&self, command: &str) -> Result<String, ExecError> {
        let (chunks, exit_status) = self.collect(command).await?;
        let mut combined = Vec::new();
        for chunk in &chunks {
            combined.extend_from_slice(chunk.as_bytes());
        }
        let combined = String::from_utf8_lossy(&combined).into_owned();
        if exit_status != 0 {
            return Err(self.surface(ExecError::exit(exit_status, &combined)));
        }
        Ok(combined)
    }

    /// Run `command` and return `(stdout, stderr)`.
    pub async fn execute_split(&self, command: &str) -> Result<(String, String), ExecError> {
        let (chunks, exit_status) = self.collect(command).await?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for chunk in chunks {
            match chunk {
                CommandOutput::StdOut(bytes) => stdout.extend_from_slice(&bytes),
                CommandOutput::StdErr(bytes) => stderr.extend_from_slice(&bytes),
            }
        }
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if exit_status != 0 {
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(self.surface(ExecError::exit(exit_status, detail)));
        }
        Ok((stdout, stderr))
    }

    /// Run `command` and return every output chunk with the exit status.
    ///
    /// A non-zero exit status is not an error here.
    pub async fn execute_chunks(
        &self,
        command: &str,
    ) -> Result<(Vec<CommandOutput>, u32), ExecError> {
        self.collect(command).await
    }

    /// Run a long-lived command, calling `on_line` for each stdout line.
    ///
    /// Returns once the remote read loop has exited. After `cancel` fires no
    /// further lines are delivered and the call resolves to `Ok(())`; the
    /// remote process may outlive the return. Stderr is not delivered; it
    /// becomes the message of the error when the command fails.
    pub async fn execute_streaming<F>(
        &self,
        command: &str,
        mut on_line: F,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError>
    where
        F: FnMut(String) + Send,
    {
        let transport = self.transport()?;
        let (tx, mut rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        let producer = transport.exec_stream(command, tx, cancel.clone());
        let consumer = async {
            let mut splitter = LineSplitter::new();
            let mut stderr = Vec::new();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    CommandOutput::StdOut(bytes) => {
                        for line in splitter.push(&bytes) {
                            if cancel.is_cancelled() {
                                break;
                            }
                            on_line(line);
                        }
                    }
                    CommandOutput::StdErr(bytes) => stderr.extend_from_slice(&bytes),
                }
            }
            if !cancel.is_cancelled() {
                if let Some(rest) = splitter.finish() {
                    on_line(rest);
                }
            }
            String::from_utf8_lossy(&stderr).into_owned()
        };

        let (status, stderr) = tokio::join!(producer, consumer);
        match status {
            Ok(_) if cancel.is_cancelled() => Ok(()),
            Ok(0) => Ok(()),
            Ok(code) => Err(self.surface(ExecError::exit(code, &stderr))),
            Err(ExecError::Cancelled) => Ok(()),
            Err(e) => Err(self.fail(&transport, e)),
        }
    }

    /// Stat a remote path.
    pub async fn stat(&self, remote_path: &str) -> Result<RemoteMetadata, ExecError> {
        let transport = self.transport()?;
        transport
            .stat(remote_path)
            .await
            .map_err(|e| self.fail(&transport, e))
    }

    /// Copy a local file to `remote_path`, reporting `(transferred, total)`.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        let transport = self.transport()?;
        transport
            .upload(local_path, remote_path, progress, cancel)
            .await
            .map_err(|e| self.fail(&transport, e))
    }

    /// Copy `remote_path` to a local file, reporting `(transferred, total)`.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        let transport = self.transport()?;
        transport
            .download(remote_path, local_path, progress, cancel)
            .await
            .map_err(|e| self.fail(&transport, e))
    }

    /// The live transport, or `NotConnected` without any network activity.
    fn transport(&self) -> Result<Arc<dyn Transport>, ExecError> {
        let transport = {
            let live = self.live.read().unwrap_or_else(PoisonError::into_inner);
            match live.as_ref() {
                Some(live) => live.transport.clone(),
                None => return Err(ExecError::NotConnected),
            }
        };
        if transport.is_closed() {
            self.drop_transport(&transport, "connection closed");
            return Err(ExecError::NotConnected);
        }
        Ok(transport)
    }

    async fn collect(&self, command: &str) -> Result<(Vec<CommandOutput>, u32), ExecError> {
        let transport = self.transport()?;
        let (tx, mut rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        let producer = transport.exec_stream(command, tx, CancellationToken::new());
        let consumer = async {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                tracing::trace!("{} output bytes from '{}'", chunk.as_bytes().len(), command);
                chunks.push(chunk);
            }
            chunks
        };

        let (status, chunks) = tokio::join!(producer, consumer);
        let exit_status = status.map_err(|e| self.fail(&transport, e))?;
        Ok((chunks, exit_status))
    }

    fn fail(&self, transport: &Arc<dyn Transport>, err: ExecError) -> ExecError {
        if let ExecError::TransportDropped(reason) = &err {
            self.drop_transport(transport, reason);
            return err;
        }
        self.surface(err)
    }

    fn surface(&self, err: ExecError) -> ExecError {
        if !err.is_cancelled() {
            self.record_error(err.to_string());
        }
        err
    }

    fn drop_transport(&self, transport: &Arc<dyn Transport>, reason: &str) {
        let cleared = {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            let current = live
                .as_ref()
                .is_some_and(|live| Arc::ptr_eq(&live.transport, transport));
            if current {
                *live = None;
            }
            current
        };

        if cleared {
            tracing::warn!("Connection lost: {}", reason);
            let message = format!("Connection lost: {reason}");
            self.record_error(message.clone());
            self.state_tx.send_replace(ConnectionState::Failed { message });
        }
    }

    fn take_live(&self) -> Option<Live> {
        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record_error(&self, message: String) {
        *self.last_error_slot() = Some(message);
    }

    fn last_error_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
