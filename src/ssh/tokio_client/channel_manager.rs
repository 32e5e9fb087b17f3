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

//! SSH channel operations: opening session channels and running commands
//! with their output streamed back as it arrives.

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use super::connection::Client;

/// One unit of output received from a remote command, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    StdOut(Vec<u8>),
    StdErr(Vec<u8>),
}

impl CommandOutput {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CommandOutput::StdOut(data) | CommandOutput::StdErr(data) => data,
        }
    }
}

enum Next {
    Cancelled,
    Message(Option<ChannelMsg>),
}

impl Client {
    /// Get a new SSH channel for communication.
    pub async fn get_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }

    /// Execute a remote command, forwarding every output chunk to `sender`.
    ///
    /// Returns the exit status once the channel closes. `cancel` is checked
    /// between channel messages; when it fires the channel is closed and
    /// [`Error::Cancelled`](super::Error::Cancelled) is returned. A dropped
    /// receiver is treated the same way.
    ///
    /// Every invocation runs in a fresh shell context on its own channel.
    pub async fn execute_streaming(
        &self,
        command: &str,
        sender: Sender<CommandOutput>,
        cancel: CancellationToken,
    ) -> Result<u32, super::Error> {
        let mut channel = self.get_channel().await?;
        channel.exec(true, command).await?;

        let mut exit_status: Option<u32> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Cancelled,
                msg = channel.wait() => Next::Message(msg),
            };

            let msg = match next {
                Next::Cancelled => {
                    tracing::trace!("Cancelling command channel: {}", command);
                    let _ = channel.close().await;
                    return Err(super::Error::Cancelled);
                }
                Next::Message(Some(msg)) => msg,
                Next::Message(None) => break,
            };

            let output = match msg {
                ChannelMsg::Data { ref data } => Some(CommandOutput::StdOut(data.to_vec())),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    Some(CommandOutput::StdErr(data.to_vec()))
                }
                // The exit status may precede trailing data, so keep reading
                // until the channel is closed.
                ChannelMsg::ExitStatus { exit_status: status } => {
                    exit_status = Some(status);
                    None
                }
                _ => None,
            };

            if let Some(output) = output {
                if sender.send(output).await.is_err() {
                    tracing::trace!("Output receiver dropped, closing channel");
                    let _ = channel.close().await;
                    return Err(super::Error::Cancelled);
                }
            }
        }

        exit_status.ok_or(super::Error::CommandDidntExit)
    }
}
