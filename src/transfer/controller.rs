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
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::rate::RateMeter;
use super::types::{
    BatchSummary, Direction, ItemOutcome, TransferError, TransferEvent, TransferItem,
    TransferOptions, TransferProgress,
};
use crate::session::{ExecError, Session};

/// Runs transfer batches one item at a time.
///
/// Only one batch runs at a time. [`TransferController::cancel_batch`]
/// stops the batch before its next item and asks the item in flight to stop
/// at its next chunk boundary; partial destinations are left in place.
pub struct TransferController {
    session: Arc<Session>,
    options: TransferOptions,
    events: mpsc::UnboundedSender<TransferEvent>,
    current: Mutex<Option<CancellationToken>>,
}

/// Frees the batch slot when the batch ends, however it ends.
struct BatchSlot<'a> {
    current: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for BatchSlot<'_> {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TransferController {
    pub fn new(
        session: Arc<Session>,
        options: TransferOptions,
    ) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            session,
            options,
            events,
            current: Mutex::new(None),
        };
        (controller, rx)
    }

    pub fn is_running(&self) -> bool {
        self.current_slot().is_some()
    }

    /// Request cancellation of the running batch. Returns false if idle.
    pub fn cancel_batch(&self) -> bool {
        match self.current_slot().as_ref() {
            Some(token) => {
                tracing::debug!("Transfer batch cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a batch to the end and return its summary.
    pub async fn run_batch(
        &self,
        items: Vec<TransferItem>,
        direction: Direction,
    ) -> Result<BatchSummary, TransferError> {
        let cancel = self.claim()?;
        Ok(self.execute(items, direction, cancel).await)
    }

    /// Start a batch in the background.
    ///
    /// The slot is claimed before returning, so a second call fails with
    /// [`TransferError::BatchInProgress`] even if the task has not run yet.
    pub fn start_batch(
        self: &Arc<Self>,
        items: Vec<TransferItem>,
        direction: Direction,
    ) -> Result<JoinHandle<BatchSummary>, TransferError> {
        let cancel = self.claim()?;
        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move {
            controller.execute(items, direction, cancel).await
        }))
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self) -> Result<CancellationToken, TransferError> {
        let mut current = self.current_slot();
        if current.is_some() {
            return Err(TransferError::BatchInProgress);
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(token)
    }

    fn emit(&self, event: TransferEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Transfer event receiver dropped");
        }
    }

    async fn execute(
        &self,
        items: Vec<TransferItem>,
        direction: Direction,
        cancel: CancellationToken,
    ) -> BatchSummary {
        let slot = BatchSlot {
            current: &self.current,
        };
        tracing::info!("Starting {} batch of {} item(s)", direction, items.len());

        let mut outcomes = Vec::with_capacity(items.len());
        let mut aborted = None;

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!("Batch cancelled before item {}", index);
                break;
            }

            let outcome = match self.transfer_item(index, item, direction, &cancel).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(
                        "Aborting {} batch at item {}: {}",
                        direction,
                        index,
                        error
                    );
                    aborted = Some(error.to_string());
                    ItemOutcome::Failed(error.to_string())
                }
            };

            if let ItemOutcome::Failed(reason) = &outcome {
                tracing::warn!("{} of {} failed: {}", direction, item.source(direction), reason);
            }
            self.emit(TransferEvent::ItemFinished {
                index,
                outcome: outcome.clone(),
            });
            outcomes.push(outcome);

            if aborted.is_some() {
                break;
            }
        }

        outcomes.resize(items.len(), ItemOutcome::NotStarted);
        let summary = BatchSummary::new(direction, outcomes, aborted);
        tracing::info!(
            "{} batch finished: {} completed, {} failed, {} skipped, {} cancelled",
            direction,
            summary.completed,
            summary.failed,
            summary.skipped,
            summary.cancelled
        );

        drop(slot);
        self.emit(TransferEvent::BatchFinished(summary.clone()));
        summary
    }

    /// Transfer one item. `Err` means the connection is gone and the batch
    /// must stop; every other failure is an [`ItemOutcome`].
    async fn transfer_item(
        &self,
        index: usize,
        item: &TransferItem,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, ExecError> {
        let (is_dir, known_total) = match direction {
            Direction::Upload => match tokio::fs::metadata(&item.local).await {
                Ok(metadata) => (metadata.is_dir(), Some(metadata.len())),
                Err(e) => {
                    return Ok(ItemOutcome::Failed(format!(
                        "{}: {}",
                        item.local.display(),
                        e
                    )))
                }
            },
            Direction::Download => match self.session.stat(&item.remote).await {
                Ok(metadata) => (metadata.is_dir, metadata.size),
                Err(e) => return Self::failure(e, cancel),
            },
        };

        if is_dir {
            tracing::debug!("Skipping directory {}", item.source(direction));
            return Ok(ItemOutcome::Skipped);
        }

        tracing::debug!(
            "Item {}: {} {} <-> {}",
            index,
            direction,
            item.local.display(),
            item.remote
        );
        self.emit(TransferEvent::ItemStarted {
            index,
            total_bytes: known_total,
        });

        let mut tracker = ProgressTracker::new(index, known_total, &self.options, &self.events);
        let mut on_progress = |transferred: u64, total: Option<u64>| {
            tracker.update(transferred, total);
        };

        let result = match direction {
            Direction::Upload => {
                self.session
                    .upload(&item.local, &item.remote, &mut on_progress, cancel)
                    .await
            }
            Direction::Download => {
                self.session
                    .download(&item.remote, &item.local, &mut on_progress, cancel)
                    .await
            }
        };

        match result {
            Ok(bytes) => {
                tracker.complete(bytes);
                Ok(ItemOutcome::Completed { bytes })
            }
            Err(e) => Self::failure(e, cancel),
        }
    }

    fn failure(error: ExecError, cancel: &CancellationToken) -> Result<ItemOutcome, ExecError> {
        if cancel.is_cancelled() || error.is_cancelled() {
            tracing::debug!("Item stopped after cancellation: {}", error);
            Ok(ItemOutcome::Cancelled)
        } else if error.is_connection_loss() {
            Err(error)
        } else {
            Ok(ItemOutcome::Failed(error.to_string()))
        }
    }
}

/// Turns raw byte-copy callbacks into throttled, monotonic progress events.
///
/// A tick that reaches the total is held back; the final tick is sent by
/// [`ProgressTracker::complete`] once the copy has succeeded.
struct ProgressTracker<'a> {
    index: usize,
    total: Option<u64>,
    transferred: u64,
    last_emit: Option<Instant>,
    interval: std::time::Duration,
    rate: RateMeter,
    events: &'a mpsc::UnboundedSender<TransferEvent>,
}

impl<'a> ProgressTracker<'a> {
    fn new(
        index: usize,
        total: Option<u64>,
        options: &TransferOptions,
        events: &'a mpsc::UnboundedSender<TransferEvent>,
    ) -> Self {
        Self {
            index,
            total,
            transferred: 0,
            last_emit: None,
            interval: options.progress_interval,
            rate: RateMeter::new(options.rate_window),
            events,
        }
    }

    fn update(&mut self, transferred: u64, total: Option<u64>) {
        if let Some(total) = total {
            self.total = Some(total.max(self.transferred));
        }
        let transferred = match self.total {
            Some(total) => transferred.min(total),
            None => transferred,
        };
        if transferred < self.transferred {
            return;
        }
        self.transferred = transferred;

        let now = Instant::now();
        let rate = self.rate.record(now, transferred);

        if self.total == Some(transferred) {
            return;
        }
        let due = self
            .last_emit
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last_emit = Some(now);
            self.send(rate);
        }
    }

    fn complete(&mut self, bytes: u64) {
        let final_bytes = bytes.max(self.transferred);
        self.transferred = final_bytes;
        self.total = Some(final_bytes);
        let rate = self.rate.record(Instant::now(), final_bytes);
        self.send(rate);
    }

    fn send(&self, rate: f64) {
        let progress = TransferProgress {
            index: self.index,
            transferred: self.transferred,
            total: self.total,
            rate,
        };
        if self.events.send(TransferEvent::Progress(progress)).is_err() {
            tracing::trace!("Transfer progress receiver dropped");
        }
    }
}
