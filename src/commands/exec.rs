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

use crate::executor::{CommandExecutor, CommandRequest, CommandResult, ResultShape};
use crate::session::{ExecError, Session};

pub async fn execute_command(session: Arc<Session>, command: &str, split: bool) -> Result<()> {
    let executor = CommandExecutor::new(session);
    let request = CommandRequest::new(command);
    let shape = if split {
        ResultShape::Split
    } else {
        ResultShape::Combined
    };

    let result = match executor.run(&request, shape).await {
        Ok(result) => result,
        Err(ExecError::RemoteExec {
            exit_status: Some(status),
            message,
        }) => {
            eprintln!("{}", message.dimmed());
            anyhow::bail!("Remote command exited with status {status}");
        }
        Err(e) => return Err(e.into()),
    };

    let mut stdout = std::io::stdout().lock();
    match result {
        CommandResult::Split { stdout: out, stderr } => {
            writeln!(stdout, "{}", "── stdout ──".cyan())?;
            write!(stdout, "{out}")?;
            writeln!(stdout, "{}", "── stderr ──".yellow())?;
            write!(stdout, "{stderr}")?;
        }
        other => write!(stdout, "{}", other.stdout())?,
    }
    stdout.flush()?;
    Ok(())
}
