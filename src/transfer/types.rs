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

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// One file to copy. The batch [`Direction`] decides which side is the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub local: PathBuf,
    pub remote: String,
}

impl TransferItem {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn source(&self, direction: Direction) -> String {
        match direction {
            Direction::Upload => self.local.display().to_string(),
            Direction::Download => self.remote.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Minimum spacing between progress events for one item.
    pub progress_interval: Duration,
    /// Span the transfer rate is averaged over.
    pub rate_window: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(100),
            rate_window: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub index: usize,
    pub transferred: u64,
    pub total: Option<u64>,
    /// Bytes per second over the rate window.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed { bytes: u64 },
    /// Directories are not transferred.
    Skipped,
    Failed(String),
    /// Stopped by batch cancellation; the destination may be partial.
    Cancelled,
    /// Never reached because the batch was cancelled or aborted first.
    NotStarted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    ItemStarted {
        index: usize,
        total_bytes: Option<u64>,
    },
    Progress(TransferProgress),
    ItemFinished {
        index: usize,
        outcome: ItemOutcome,
    },
    /// Sent exactly once per batch, last.
    BatchFinished(BatchSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub direction: Direction,
    /// One entry per item, in batch order.
    pub outcomes: Vec<ItemOutcome>,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Set when a connection loss stopped the batch.
    pub aborted: Option<String>,
}

impl BatchSummary {
    pub fn new(direction: Direction, outcomes: Vec<ItemOutcome>, aborted: Option<String>) -> Self {
        let count = |pred: fn(&ItemOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
        Self {
            direction,
            completed: count(|o| matches!(o, ItemOutcome::Completed { .. })),
            failed: count(|o| matches!(o, ItemOutcome::Failed(_))),
            skipped: count(|o| matches!(o, ItemOutcome::Skipped)),
            cancelled: count(|o| matches!(o, ItemOutcome::Cancelled | ItemOutcome::NotStarted)),
            outcomes,
            aborted,
        }
    }

    /// True if nothing failed and the batch ran to the end.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.aborted.is_none() && self.cancelled == 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.aborted.is_none() && self.cancelled > 0
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                ItemOutcome::Completed { bytes } => *bytes,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("A transfer batch is already running")]
    BatchInProgress,
}
