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

use std::time::Duration;

use crate::session::ExecError;
use crate::utils::shell;

/// Where the controller is in the select/snapshot/stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Idle,
    Debouncing,
    LoadingSnapshot,
    SnapshotLoaded,
    StreamPending,
    Streaming,
    Stopping,
}

/// Updates published to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// Replace the displayed content.
    Snapshot { target: String, content: String },
    /// Append to the displayed content. Always ends with a newline.
    Append { target: String, text: String },
    /// The snapshot or stream for the selected target failed.
    Error { target: String, error: ExecError },
    /// The remote stream ended on its own.
    Ended { target: String },
}

impl TailEvent {
    pub fn target(&self) -> &str {
        match self {
            TailEvent::Snapshot { target, .. }
            | TailEvent::Append { target, .. }
            | TailEvent::Error { target, .. }
            | TailEvent::Ended { target } => target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailTimings {
    /// Quiet period after a selection before the snapshot is read.
    pub debounce: Duration,
    /// Delay between a loaded snapshot and opening the continuous read.
    pub stream_delay: Duration,
    /// Coalescing window for streamed lines; reset by every line.
    pub flush_interval: Duration,
    /// How long to wait for a stopped stream to exit.
    pub stop_grace: Duration,
    /// Flush immediately once this many lines are buffered.
    pub max_buffered_lines: usize,
}

impl Default for TailTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            stream_delay: Duration::from_millis(1000),
            flush_interval: Duration::from_millis(50),
            stop_grace: Duration::from_millis(300),
            max_buffered_lines: 1000,
        }
    }
}

pub const DEFAULT_SNAPSHOT_COMMAND: &str = "tail -n {lines} -- {path}";
pub const DEFAULT_FOLLOW_COMMAND: &str = "tail -n 0 --follow=name -- {path}";

/// Command templates. `{path}` is replaced shell-quoted, `{lines}` with the
/// window size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCommands {
    pub snapshot: String,
    pub follow: String,
}

impl Default for TailCommands {
    fn default() -> Self {
        Self {
            snapshot: DEFAULT_SNAPSHOT_COMMAND.to_string(),
            follow: DEFAULT_FOLLOW_COMMAND.to_string(),
        }
    }
}

impl TailCommands {
    pub fn snapshot_for(&self, path: &str, lines: usize) -> String {
        self.snapshot
            .replace("{lines}", &lines.to_string())
            .replace("{path}", &shell::quote(path))
    }

    pub fn follow_for(&self, path: &str) -> String {
        self.follow.replace("{path}", &shell::quote(path))
    }
}

const MISSING_MARKERS: &[&str] = &["No such file", "inaccessible", "no files remaining"];

/// Map a failure to [`ExecError::TargetMissing`] when the remote output says
/// the file is gone.
pub(crate) fn classify_failure(target: &str, error: ExecError) -> ExecError {
    match &error {
        ExecError::RemoteExec { message, .. }
            if MISSING_MARKERS.iter().any(|marker| message.contains(marker)) =>
        {
            ExecError::TargetMissing(target.to_string())
        }
        _ => error,
    }
}
