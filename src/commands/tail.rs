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

use anyhow::Result;
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::Arc;

use crate::config::TailConfig;
use crate::executor::CommandExecutor;
use crate::session::Session;
use crate::tail::{LiveTailController, TailEvent};

/// Print the last `lines` lines of `path` and follow it until Ctrl-C.
pub async fn tail_file(
    session: Arc<Session>,
    config: &TailConfig,
    path: &str,
    lines: usize,
) -> Result<()> {
    let executor = CommandExecutor::new(session);
    let (controller, mut events) =
        LiveTailController::new(executor, config.timings(), config.commands());
    controller.select_target(path, lines);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("Interrupted, stopping tail");
                break Ok(());
            }
            event = events.recv() => match event {
                Some(TailEvent::Snapshot { content, .. }) => print_text(&content)?,
                Some(TailEvent::Append { text, .. }) => print_text(&text)?,
                Some(TailEvent::Ended { target }) => {
                    eprintln!("{} {}", "■".dimmed(), format!("{target} closed").dimmed());
                    break Ok(());
                }
                Some(TailEvent::Error { target, error }) => {
                    break Err(anyhow::anyhow!("{target}: {error}"));
                }
                None => break Ok(()),
            }
        }
    };

    controller.shutdown().await;
    outcome
}

fn print_text(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
