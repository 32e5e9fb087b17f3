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

//! Uniform command invocation over a [`Session`].
//!
//! The executor holds no state besides the session reference. It performs
//! no retries and does not build or inspect command text.

mod result_types;

pub use result_types::{CommandRequest, CommandResult, ResultShape};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::session::{ExecError, Session};

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    session: Arc<Session>,
}

impl CommandExecutor {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run `request` and return the result in the requested shape.
    pub async fn run(
        &self,
        request: &CommandRequest,
        shape: ResultShape,
    ) -> Result<CommandResult, ExecError> {
        tracing::debug!("Executing ({:?}): {}", shape, request.text);
        match shape {
            ResultShape::Combined => self.combined(request).await.map(CommandResult::Combined),
            ResultShape::Split => self
                .split(request)
                .await
                .map(|(stdout, stderr)| CommandResult::Split { stdout, stderr }),
            ResultShape::StreamChunks => {
                let (chunks, exit_status) = self.session.execute_chunks(&request.text).await?;
                Ok(CommandResult::StreamChunks {
                    chunks,
                    exit_status,
                })
            }
        }
    }

    pub async fn combined(&self, request: &CommandRequest) -> Result<String, ExecError> {
        self.session.execute(&request.text).await
    }

    pub async fn split(&self, request: &CommandRequest) -> Result<(String, String), ExecError> {
        self.session.execute_split(&request.text).await
    }

    /// Run a long-lived command, one callback per stdout line.
    ///
    /// See [`Session::execute_streaming`] for the cancellation contract.
    pub async fn stream<F>(
        &self,
        request: &CommandRequest,
        on_line: F,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError>
    where
        F: FnMut(String) + Send,
    {
        tracing::debug!("Streaming: {}", request.text);
        self.session
            .execute_streaming(&request.text, on_line, cancel)
            .await
    }
}
