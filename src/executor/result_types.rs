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

//! Request and result types for command execution.

use crate::session::CommandOutput;

/// A fully formed shell command.
///
/// The text is sent as is; quoting is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub text: String,
}

impl CommandRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for CommandRequest {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for CommandRequest {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Which [`CommandResult`] variant a caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultShape {
    #[default]
    Combined,
    Split,
    StreamChunks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Stdout and stderr interleaved in arrival order.
    Combined(String),
    Split {
        stdout: String,
        stderr: String,
    },
    /// Raw chunks tagged with their channel, plus the exit status.
    StreamChunks {
        chunks: Vec<CommandOutput>,
        exit_status: u32,
    },
}

impl CommandResult {
    pub fn shape(&self) -> ResultShape {
        match self {
            CommandResult::Combined(_) => ResultShape::Combined,
            CommandResult::Split { .. } => ResultShape::Split,
            CommandResult::StreamChunks { .. } => ResultShape::StreamChunks,
        }
    }

    /// Everything written to stdout, whatever the shape.
    ///
    /// For [`CommandResult::Combined`] this is the whole combined text.
    pub fn stdout(&self) -> String {
        match self {
            CommandResult::Combined(text) => text.clone(),
            CommandResult::Split { stdout, .. } => stdout.clone(),
            CommandResult::StreamChunks { chunks, .. } => {
                let bytes: Vec<u8> = chunks
                    .iter()
                    .filter_map(|chunk| match chunk {
                        CommandOutput::StdOut(bytes) => Some(bytes.as_slice()),
                        CommandOutput::StdErr(_) => None,
                    })
                    .flatten()
                    .copied()
                    .collect();
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }
}
