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

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::buffer::LineBuffer;
use super::state::{classify_failure, TailCommands, TailEvent, TailState, TailTimings};
use crate::executor::{CommandExecutor, CommandRequest};
use crate::session::ExecError;

/// Keeps one live view of a selected remote file.
///
/// Selecting a target starts a debounce timer. When it fires, any running
/// stream is stopped and awaited, the last N lines are read and published
/// as a [`TailEvent::Snapshot`], and after a further delay a continuous read
/// is opened whose lines are coalesced into [`TailEvent::Append`] updates.
///
/// Every selection or clear advances an epoch. Each background step carries
/// the epoch it was started under and does nothing once it is stale, so a
/// late result for an abandoned target is never published.
///
/// Methods that schedule work spawn onto the current tokio runtime and must
/// be called from within one.
pub struct LiveTailController {
    shared: Arc<Shared>,
}

struct Shared {
    executor: CommandExecutor,
    timings: TailTimings,
    commands: TailCommands,
    events: mpsc::UnboundedSender<TailEvent>,
    inner: Mutex<Inner>,
    /// Held while stopping or starting a stream.
    stream_gate: tokio::sync::Mutex<()>,
}

#[derive(Debug, Clone)]
struct Selection {
    target: String,
    lines: usize,
}

struct ActiveStream {
    target: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    epoch: u64,
    selection: Option<Selection>,
    state: TailState,
    /// Debounce, snapshot and promotion steps of the current epoch.
    pending: Option<CancellationToken>,
    stream: Option<ActiveStream>,
    /// Target of the live stream; `None` while no stream may deliver.
    active_target: Option<String>,
    buffer: LineBuffer,
    flush_timer: Option<CancellationToken>,
}

impl LiveTailController {
    pub fn new(
        executor: CommandExecutor,
        timings: TailTimings,
        commands: TailCommands,
    ) -> (Self, mpsc::UnboundedReceiver<TailEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            executor,
            inner: Mutex::new(Inner {
                epoch: 0,
                selection: None,
                state: TailState::Idle,
                pending: None,
                stream: None,
                active_target: None,
                buffer: LineBuffer::new(timings.max_buffered_lines),
                flush_timer: None,
            }),
            timings,
            commands,
            events,
            stream_gate: tokio::sync::Mutex::new(()),
        });
        (Self { shared }, rx)
    }

    /// Select `target` and show its last `lines` lines, then follow it.
    pub fn select_target(&self, target: impl Into<String>, lines: usize) {
        let target = target.into();
        let (epoch, token) = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            inner.detach();
            tracing::debug!("Tail target selected: {} (epoch {})", target, inner.epoch);
            inner.selection = Some(Selection { target, lines });
            inner.state = TailState::Debouncing;
            let token = CancellationToken::new();
            inner.pending = Some(token.clone());
            (inner.epoch, token)
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(shared.timings.debounce) => {}
            }
            shared.activate(epoch, token).await;
        });
    }

    /// Deselect the current target. Teardown finishes in the background.
    pub fn clear_target(&self) {
        let epoch = self.begin_clear();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.finish_clear(epoch).await;
        });
    }

    /// Deselect the current target and wait until its stream has stopped.
    pub async fn shutdown(&self) {
        let epoch = self.begin_clear();
        self.shared.finish_clear(epoch).await;
    }

    pub fn state(&self) -> TailState {
        self.shared.lock().state
    }

    /// The target whose continuous read is currently alive.
    pub fn active_target(&self) -> Option<String> {
        self.shared.lock().active_target.clone()
    }

    /// The target most recently selected and not cleared.
    pub fn selected_target(&self) -> Option<String> {
        self.shared
            .lock()
            .selection
            .as_ref()
            .map(|selection| selection.target.clone())
    }

    fn begin_clear(&self) -> u64 {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        inner.detach();
        inner.selection = None;
        inner.state = if inner.stream.is_some() {
            TailState::Stopping
        } else {
            TailState::Idle
        };
        tracing::debug!("Tail target cleared (epoch {})", inner.epoch);
        inner.epoch
    }
}

impl Drop for LiveTailController {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        inner.detach();
    }
}

impl Inner {
    /// Stop everything the previous epoch scheduled.
    ///
    /// The active target is cleared before the stream is told to stop, so
    /// no line arriving during teardown can be buffered or flushed.
    fn detach(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.active_target = None;
        if let Some(timer) = self.flush_timer.take() {
            timer.cancel();
        }
        self.buffer.clear();
        if let Some(stream) = &self.stream {
            stream.cancel.cancel();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    fn emit(&self, event: TailEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Tail event receiver dropped");
        }
    }

    /// Debounce elapsed: stop the old stream, then load the snapshot.
    async fn activate(self: Arc<Self>, epoch: u64, token: CancellationToken) {
        let selection = {
            let _gate = self.stream_gate.lock().await;
            if !self.is_current(epoch) {
                return;
            }
            self.stop_stream(epoch).await;

            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            let Some(selection) = inner.selection.clone() else {
                return;
            };
            inner.state = TailState::LoadingSnapshot;
            selection
        };

        let request =
            CommandRequest::new(self.commands.snapshot_for(&selection.target, selection.lines));
        let result = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Snapshot of {} abandoned", selection.target);
                return;
            }
            result = self.executor.combined(&request) => result,
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!("Discarding stale snapshot of {}", selection.target);
            return;
        }

        match result {
            Ok(content) => {
                inner.state = TailState::SnapshotLoaded;
                tracing::debug!(
                    "Snapshot of {} loaded ({} bytes)",
                    selection.target,
                    content.len()
                );
                self.emit(TailEvent::Snapshot {
                    target: selection.target.clone(),
                    content,
                });

                inner.state = TailState::StreamPending;
                let shared = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(shared.timings.stream_delay) => {}
                    }
                    shared.promote(epoch).await;
                });
            }
            Err(error) => {
                inner.state = TailState::Idle;
                inner.pending = None;
                let error = classify_failure(&selection.target, error);
                tracing::debug!("Snapshot of {} failed: {}", selection.target, error);
                self.emit(TailEvent::Error {
                    target: selection.target,
                    error,
                });
            }
        }
    }

    /// Promotion delay elapsed: open the continuous read.
    async fn promote(self: Arc<Self>, epoch: u64) {
        let _gate = self.stream_gate.lock().await;
        if !self.is_current(epoch) {
            return;
        }
        self.stop_stream(epoch).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        let Some(target) = inner.selection.as_ref().map(|s| s.target.clone()) else {
            return;
        };

        let cancel = CancellationToken::new();
        inner.pending = None;
        inner.active_target = Some(target.clone());
        inner.state = TailState::Streaming;
        tracing::debug!("Streaming {} (epoch {})", target, epoch);

        let handle = tokio::spawn(Arc::clone(&self).run_stream(
            epoch,
            target.clone(),
            cancel.clone(),
        ));
        inner.stream = Some(ActiveStream {
            target,
            cancel,
            handle,
        });
    }

    async fn run_stream(self: Arc<Self>, epoch: u64, target: String, cancel: CancellationToken) {
        let request = CommandRequest::new(self.commands.follow_for(&target));
        let sink = Arc::clone(&self);
        let line_target = target.clone();
        let result = self
            .executor
            .stream(
                &request,
                move |line| sink.on_line(epoch, &line_target, line),
                &cancel,
            )
            .await;
        self.stream_finished(epoch, &target, &cancel, result);
    }

    fn on_line(self: &Arc<Self>, epoch: u64, target: &str, line: String) {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.active_target.as_deref() != Some(target) {
            tracing::trace!("Dropping line for inactive target {}", target);
            return;
        }

        if let Some(timer) = inner.flush_timer.take() {
            timer.cancel();
        }

        if inner.buffer.push(line) {
            self.flush_locked(&mut inner, target);
            return;
        }

        let timer = CancellationToken::new();
        inner.flush_timer = Some(timer.clone());
        let shared = Arc::clone(self);
        let target = target.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(shared.timings.flush_interval) => {
                    shared.flush(epoch, &target, &timer);
                }
            }
        });
    }

    fn flush(&self, epoch: u64, target: &str, timer: &CancellationToken) {
        let mut inner = self.lock();
        // A newer line or a teardown cancels the timer under this same lock.
        if timer.is_cancelled()
            || inner.epoch != epoch
            || inner.active_target.as_deref() != Some(target)
        {
            return;
        }
        inner.flush_timer = None;
        self.flush_locked(&mut inner, target);
    }

    fn flush_locked(&self, inner: &mut Inner, target: &str) {
        let lines = inner.buffer.len();
        if let Some(text) = inner.buffer.take() {
            tracing::trace!("Flushing {} lines for {}", lines, target);
            self.emit(TailEvent::Append {
                target: target.to_string(),
                text,
            });
        }
    }

    /// The stream returned. Only a natural end of the live stream is
    /// reported; a stopped or superseded stream is already accounted for.
    fn stream_finished(
        &self,
        epoch: u64,
        target: &str,
        cancel: &CancellationToken,
        result: Result<(), ExecError>,
    ) {
        let mut inner = self.lock();
        if cancel.is_cancelled()
            || inner.epoch != epoch
            || inner.active_target.as_deref() != Some(target)
        {
            tracing::debug!("Stream for {} stopped", target);
            return;
        }

        if let Some(timer) = inner.flush_timer.take() {
            timer.cancel();
        }
        self.flush_locked(&mut inner, target);
        inner.active_target = None;
        inner.stream = None;
        inner.state = TailState::Idle;

        match result {
            Ok(()) => {
                tracing::debug!("Stream for {} ended", target);
                self.emit(TailEvent::Ended {
                    target: target.to_string(),
                });
            }
            Err(error) => {
                let error = classify_failure(target, error);
                tracing::warn!("Stream for {} failed: {}", target, error);
                self.emit(TailEvent::Error {
                    target: target.to_string(),
                    error,
                });
            }
        }
    }

    /// Stop the running stream, if any, and wait for it to exit.
    ///
    /// Must be called with `stream_gate` held.
    async fn stop_stream(&self, epoch: u64) {
        let stream = {
            let mut inner = self.lock();
            inner.active_target = None;
            if let Some(timer) = inner.flush_timer.take() {
                timer.cancel();
            }
            inner.buffer.clear();
            let stream = inner.stream.take();
            if stream.is_some() && inner.epoch == epoch {
                inner.state = TailState::Stopping;
            }
            stream
        };

        let Some(stream) = stream else {
            return;
        };
        stream.cancel.cancel();
        tracing::debug!("Stopping stream for {}", stream.target);
        if tokio::time::timeout(self.timings.stop_grace, stream.handle)
            .await
            .is_err()
        {
            tracing::warn!(
                "Stream for {} did not stop within {:?}",
                stream.target,
                self.timings.stop_grace
            );
        }
    }

    async fn finish_clear(&self, epoch: u64) {
        let _gate = self.stream_gate.lock().await;
        self.stop_stream(epoch).await;
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.state = TailState::Idle;
        }
    }
}
