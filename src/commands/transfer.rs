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
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::session::Session;
use crate::transfer::{
    BatchSummary, Direction, ItemOutcome, TransferController, TransferEvent, TransferItem,
    TransferOptions,
};
use crate::utils::fs::{format_bytes, format_rate, remote_file_name, remote_join};

/// Pair each local file with its name under `remote_dir`.
pub fn upload_items(sources: &[PathBuf], remote_dir: &str) -> Result<Vec<TransferItem>> {
    sources
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Failed to get filename from {source:?}"))?
                .to_string_lossy();
            Ok(TransferItem::new(source, remote_join(remote_dir, &name)))
        })
        .collect()
}

/// Pair each remote file with its name under `local_dir`.
pub fn download_items(sources: &[String], local_dir: &Path) -> Result<Vec<TransferItem>> {
    sources
        .iter()
        .map(|source| {
            let name = remote_file_name(source)
                .ok_or_else(|| anyhow::anyhow!("Failed to get filename from {source}"))?;
            Ok(TransferItem::new(local_dir.join(name), source.clone()))
        })
        .collect()
}

fn create_transfer_style() -> Result<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .map_err(|e| anyhow::anyhow!("Failed to create progress bar template: {e}"))
        .map(|style| style.progress_chars("=> "))
}

/// Run one batch with a progress bar per item. Ctrl-C cancels the batch.
pub async fn run_transfer(
    session: Arc<Session>,
    options: TransferOptions,
    items: Vec<TransferItem>,
    direction: Direction,
) -> Result<()> {
    let verb = match direction {
        Direction::Upload => "Uploading",
        Direction::Download => "Downloading",
    };
    println!(
        "\n{} {} {} file(s) {}",
        "▶".cyan(),
        verb.cyan().bold(),
        items.len().to_string().yellow(),
        "(SFTP)".dimmed()
    );

    let style = create_transfer_style()?;
    let (controller, mut events) = TransferController::new(session, options);
    let controller = Arc::new(controller);
    let task = controller.start_batch(items.clone(), direction)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelling = false;
    let mut bar: Option<ProgressBar> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelling => {
                cancelling = true;
                controller.cancel_batch();
                eprintln!("{}", "Cancelling after the current chunk...".yellow());
            }
            event = events.recv() => match event {
                Some(TransferEvent::ItemStarted { index, total_bytes }) => {
                    let pb = ProgressBar::new(total_bytes.unwrap_or(0));
                    pb.set_style(style.clone());
                    pb.set_prefix(items[index].source(direction));
                    bar = Some(pb);
                }
                Some(TransferEvent::Progress(progress)) => {
                    if let Some(pb) = &bar {
                        if let Some(total) = progress.total {
                            pb.set_length(total);
                        }
                        pb.set_position(progress.transferred);
                        pb.set_message(format_rate(progress.rate));
                    }
                }
                Some(TransferEvent::ItemFinished { index, outcome }) => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                    print_outcome(&items[index], direction, &outcome);
                }
                Some(TransferEvent::BatchFinished(_)) | None => break,
            }
        }
    }

    let summary = task.await.context("Transfer task failed")?;
    print_summary(&summary);

    if let Some(reason) = &summary.aborted {
        anyhow::bail!("Transfer aborted: {reason}");
    }
    if summary.failed > 0 {
        anyhow::bail!("{} item(s) failed", summary.failed);
    }
    if summary.was_cancelled() {
        anyhow::bail!("Transfer cancelled");
    }
    Ok(())
}

fn print_outcome(item: &TransferItem, direction: Direction, outcome: &ItemOutcome) {
    let source = item.source(direction);
    match outcome {
        ItemOutcome::Completed { bytes } => println!(
            "{} {} ({})",
            "●".green(),
            source.bold(),
            format_bytes(*bytes).yellow()
        ),
        ItemOutcome::Skipped => println!("{} {} {}", "○".dimmed(), source, "(directory skipped)".dimmed()),
        ItemOutcome::Failed(reason) => println!("{} {}: {}", "●".red(), source.bold(), reason.red()),
        ItemOutcome::Cancelled => println!("{} {} {}", "●".yellow(), source, "(cancelled)".yellow()),
        ItemOutcome::NotStarted => {}
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "\n{} {} completed, {} failed, {} skipped, {} cancelled ({})",
        "Summary:".bold(),
        summary.completed.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped,
        summary.cancelled,
        format_bytes(summary.bytes_transferred())
    );
}
