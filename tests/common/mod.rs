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

//! In-memory transport used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use remsh::session::{
    CommandOutput, ConnectError, ConnectTarget, Connector, Credential, ExecError, ProgressFn,
    RemoteMetadata, Session, SessionOptions, Transport,
};

/// How the fake answers one command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send the chunks after `delay`, then exit with `exit_status`.
    Output {
        chunks: Vec<CommandOutput>,
        exit_status: u32,
        delay: Duration,
    },
    /// Fail after `delay`.
    Fail { error: ExecError, delay: Duration },
    /// Stay open until cancelled; lines are fed with [`FakeTransport::push_line`].
    Follow,
}

impl Reply {
    pub fn stdout(text: &str) -> Self {
        Reply::Output {
            chunks: vec![CommandOutput::StdOut(text.as_bytes().to_vec())],
            exit_status: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed_stdout(text: &str, delay: Duration) -> Self {
        Reply::Output {
            chunks: vec![CommandOutput::StdOut(text.as_bytes().to_vec())],
            exit_status: 0,
            delay,
        }
    }

    pub fn exit(stderr: &str, exit_status: u32) -> Self {
        Reply::Output {
            chunks: vec![CommandOutput::StdErr(stderr.as_bytes().to_vec())],
            exit_status,
            delay: Duration::ZERO,
        }
    }
}

enum FollowMsg {
    Line(String),
    End { stderr: String, exit_status: u32 },
    Drop,
}

#[derive(Debug, Clone)]
pub enum RemoteEntry {
    File(Vec<u8>),
    Dir,
}

pub struct FakeTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
    disconnects: AtomicUsize,
    followers: Mutex<HashMap<String, mpsc::UnboundedSender<FollowMsg>>>,
    active_streams: AtomicUsize,
    max_streams: AtomicUsize,
    remote: Mutex<HashMap<String, RemoteEntry>>,
    unsized_files: Mutex<HashSet<String>>,
    copy_failures: Mutex<HashMap<String, ExecError>>,
    chunk_size: usize,
    chunk_delay: Duration,
    started_copies: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            followers: Mutex::new(HashMap::new()),
            active_streams: AtomicUsize::new(0),
            max_streams: AtomicUsize::new(0),
            remote: Mutex::new(HashMap::new()),
            unsized_files: Mutex::new(HashSet::new()),
            copy_failures: Mutex::new(HashMap::new()),
            chunk_size: 4,
            chunk_delay: Duration::from_millis(10),
            started_copies: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, command: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), reply);
    }

    /// Every command executed, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Mark the connection dead, as if the peer went away.
    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open follow streams seen.
    pub fn max_streams(&self) -> usize {
        self.max_streams.load(Ordering::SeqCst)
    }

    /// Feed a line to the open follow stream for `command`.
    pub fn push_line(&self, command: &str, line: &str) -> bool {
        self.send_follow(command, FollowMsg::Line(line.to_string()))
    }

    /// End the open follow stream for `command`.
    pub fn end_stream(&self, command: &str, stderr: &str, exit_status: u32) -> bool {
        self.send_follow(
            command,
            FollowMsg::End {
                stderr: stderr.to_string(),
                exit_status,
            },
        )
    }

    /// Make the open follow stream fail as if the connection dropped.
    pub fn drop_stream(&self, command: &str) -> bool {
        self.send_follow(command, FollowMsg::Drop)
    }

    fn send_follow(&self, command: &str, msg: FollowMsg) -> bool {
        self.followers
            .lock()
            .unwrap()
            .get(command)
            .is_some_and(|tx| tx.send(msg).is_ok())
    }

    pub fn add_remote_file(&self, path: &str, contents: &[u8]) {
        self.remote
            .lock()
            .unwrap()
            .insert(path.to_string(), RemoteEntry::File(contents.to_vec()));
    }

    /// A remote file whose size is not reported by `stat` or during copy.
    pub fn add_remote_file_unsized(&self, path: &str, contents: &[u8]) {
        self.add_remote_file(path, contents);
        self.unsized_files.lock().unwrap().insert(path.to_string());
    }

    fn is_unsized(&self, path: &str) -> bool {
        self.unsized_files.lock().unwrap().contains(path)
    }

    pub fn add_remote_dir(&self, path: &str) {
        self.remote
            .lock()
            .unwrap()
            .insert(path.to_string(), RemoteEntry::Dir);
    }

    pub fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.remote.lock().unwrap().get(path) {
            Some(RemoteEntry::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Make the copy of `remote_path` fail with `error` after its first chunk.
    pub fn fail_copy(&self, remote_path: &str, error: ExecError) {
        self.copy_failures
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), error);
    }

    /// Remote paths whose copy was started, in order.
    pub fn started_copies(&self) -> Vec<String> {
        self.started_copies.lock().unwrap().clone()
    }

    fn check_open(&self) -> Result<(), ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::TransportDropped("connection reset".to_string()));
        }
        Ok(())
    }

    async fn follow(
        &self,
        command: &str,
        sender: mpsc::Sender<CommandOutput>,
        cancel: CancellationToken,
    ) -> Result<u32, ExecError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.followers
            .lock()
            .unwrap()
            .insert(command.to_string(), tx);
        let now = self.active_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_streams.fetch_max(now, Ordering::SeqCst);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(ExecError::Cancelled),
                msg = rx.recv() => match msg {
                    Some(FollowMsg::Line(line)) => {
                        let chunk = CommandOutput::StdOut(format!("{line}\n").into_bytes());
                        if sender.send(chunk).await.is_err() {
                            break Err(ExecError::Cancelled);
                        }
                    }
                    Some(FollowMsg::End { stderr, exit_status }) => {
                        if !stderr.is_empty() {
                            let _ = sender.send(CommandOutput::StdErr(stderr.into_bytes())).await;
                        }
                        break Ok(exit_status);
                    }
                    Some(FollowMsg::Drop) => {
                        self.kill();
                        break Err(ExecError::TransportDropped("connection reset".to_string()));
                    }
                    None => break Ok(0),
                }
            }
        };

        self.followers.lock().unwrap().remove(command);
        self.active_streams.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn copy(
        &self,
        remote_path: &str,
        data: &[u8],
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError> {
        self.started_copies
            .lock()
            .unwrap()
            .push(remote_path.to_string());
        let failure = self.copy_failures.lock().unwrap().get(remote_path).cloned();
        let total = (!self.is_unsized(remote_path)).then_some(data.len() as u64);
        progress(0, total);

        let mut copied = Vec::new();
        for chunk in data.chunks(self.chunk_size) {
            tokio::time::sleep(self.chunk_delay).await;
            self.check_open()?;
            copied.extend_from_slice(chunk);
            progress(copied.len() as u64, total);

            if let Some(error) = &failure {
                if error.is_connection_loss() {
                    self.kill();
                }
                return Err(error.clone());
            }
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
        }
        Ok(copied)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn remote_address(&self) -> String {
        "127.0.0.1:22".to_string()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn exec_stream(
        &self,
        command: &str,
        sender: mpsc::Sender<CommandOutput>,
        cancel: CancellationToken,
    ) -> Result<u32, ExecError> {
        self.check_open()?;
        self.calls.lock().unwrap().push(command.to_string());
        let reply = self.replies.lock().unwrap().get(command).cloned();

        match reply {
            Some(Reply::Output {
                chunks,
                exit_status,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ExecError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                self.check_open()?;
                for chunk in chunks {
                    if sender.send(chunk).await.is_err() {
                        return Err(ExecError::Cancelled);
                    }
                }
                Ok(exit_status)
            }
            Some(Reply::Fail { error, delay }) => {
                tokio::time::sleep(delay).await;
                if error.is_connection_loss() {
                    self.kill();
                }
                Err(error)
            }
            Some(Reply::Follow) => self.follow(command, sender, cancel).await,
            None => {
                let message = format!("sh: {command}: command not found\n");
                let _ = sender.send(CommandOutput::StdErr(message.into_bytes())).await;
                Ok(127)
            }
        }
    }

    async fn stat(&self, remote_path: &str) -> Result<RemoteMetadata, ExecError> {
        self.check_open()?;
        let unsized_file = self.is_unsized(remote_path);
        match self.remote.lock().unwrap().get(remote_path) {
            Some(RemoteEntry::Dir) => Ok(RemoteMetadata {
                is_dir: true,
                size: None,
            }),
            Some(RemoteEntry::File(data)) => Ok(RemoteMetadata {
                is_dir: false,
                size: (!unsized_file).then_some(data.len() as u64),
            }),
            None => Err(ExecError::remote(None, "NoSuchFile: No such file")),
        }
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        self.check_open()?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| ExecError::LocalIo(e.to_string()))?;
        let copied = self.copy(remote_path, &data, progress, cancel).await?;
        let len = copied.len() as u64;
        self.remote
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), RemoteEntry::File(copied));
        Ok(len)
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecError> {
        self.check_open()?;
        let data = self
            .remote_file(remote_path)
            .ok_or_else(|| ExecError::remote(None, "NoSuchFile: No such file"))?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecError::LocalIo(e.to_string()))?;
        }
        let copied = self.copy(remote_path, &data, progress, cancel).await?;
        tokio::fs::write(local_path, &copied)
            .await
            .map_err(|e| ExecError::LocalIo(e.to_string()))?;
        Ok(copied.len() as u64)
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeConnector {
    pub transport: Arc<FakeTransport>,
    failure: Mutex<Option<ConnectError>>,
    delay: Duration,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(transport: Arc<FakeTransport>) -> Arc<Self> {
        Self::with_delay(transport, Duration::ZERO)
    }

    pub fn with_delay(transport: Arc<FakeTransport>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            transport,
            failure: Mutex::new(None),
            delay,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn fail_with(&self, error: ConnectError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _target: &ConnectTarget,
        _credential: Credential,
    ) -> Result<Arc<dyn Transport>, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.transport.clone())
    }
}

pub fn target() -> ConnectTarget {
    ConnectTarget::new("test-host", 22, "tester")
}

/// A session already connected to a fresh fake transport.
pub async fn connected_session() -> (Arc<Session>, Arc<FakeTransport>) {
    let transport = FakeTransport::new();
    let connector = FakeConnector::new(transport.clone());
    let session = Arc::new(Session::new(connector, SessionOptions::default()));
    session
        .connect(&target(), Credential::password("secret"))
        .await
        .unwrap();
    (session, transport)
}
