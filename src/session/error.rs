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

//! Error taxonomy for the session and everything built on it.
//!
//! - [`ConnectError`]: why a connection could not be established, classified
//!   so the user sees auth vs. network vs. protocol problems.
//! - [`ExecError`]: why a command, stream or transfer did not succeed.
//!   [`ExecError::Cancelled`] is a terminal outcome, not a failure.

use std::io;
use thiserror::Error;

use crate::ssh::tokio_client;

/// Failure to establish a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Host unreachable: {0}")]
    Unreachable(String),
    #[error("Connection timed out: {0}")]
    Timeout(String),
    #[error("SSH protocol error: {0}")]
    ProtocolError(String),
    /// `disconnect` was called while the attempt was in flight.
    #[error("Connection attempt aborted by disconnect")]
    Aborted,
}

impl ConnectError {
    /// Classify a low-level client error into a user-facing category.
    pub fn classify(err: &tokio_client::Error) -> Self {
        use tokio_client::Error as E;

        if err.is_authentication() {
            return ConnectError::AuthenticationFailed(err.to_string());
        }

        match err {
            E::AddressInvalid(e) => ConnectError::Unreachable(format!("cannot resolve host: {e}")),
            E::IoError(e) => Self::from_io(e),
            E::SshError(russh::Error::IO(e)) => Self::from_io(e),
            E::SshError(russh::Error::ConnectionTimeout) => {
                ConnectError::Timeout("no response from server".to_string())
            }
            E::SshError(russh::Error::UnknownKey) | E::ServerCheckFailed => {
                ConnectError::ProtocolError("host key verification failed".to_string())
            }
            other => ConnectError::ProtocolError(other.to_string()),
        }
    }

    fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => ConnectError::Timeout(e.to_string()),
            _ => ConnectError::Unreachable(e.to_string()),
        }
    }
}

/// Failure of an execution primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// No live connection; raised before any network activity.
    #[error("Not connected")]
    NotConnected,

    /// The remote side reported a failure: non-zero exit or an error status.
    #[error("{message}")]
    RemoteExec {
        exit_status: Option<u32>,
        message: String,
    },

    /// The connection died while the operation was in flight.
    #[error("Connection lost: {0}")]
    TransportDropped(String),

    /// The caller asked the operation to stop.
    #[error("Cancelled")]
    Cancelled,

    /// The tailed file no longer exists on the remote host.
    #[error("{0} no longer exists")]
    TargetMissing(String),

    /// Reading or writing the local side of a transfer failed.
    #[error("Local I/O error: {0}")]
    LocalIo(String),
}

impl ExecError {
    pub fn remote(exit_status: Option<u32>, message: impl Into<String>) -> Self {
        ExecError::RemoteExec {
            exit_status,
            message: message.into(),
        }
    }

    /// Build the error for a command that exited with a non-zero status.
    pub fn exit(exit_status: u32, output: &str) -> Self {
        let output = output.trim();
        let message = if output.is_empty() {
            format!("Command exited with status {exit_status}")
        } else {
            format!("Command exited with status {exit_status}: {output}")
        };
        ExecError::remote(Some(exit_status), message)
    }

    /// True when the session is no longer usable for any operation.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, ExecError::NotConnected | ExecError::TransportDropped(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled)
    }

    /// Map a low-level client error, given whether the connection is still up.
    pub fn from_client(err: tokio_client::Error, connection_closed: bool) -> Self {
        use tokio_client::Error as E;

        if connection_closed {
            return ExecError::TransportDropped(err.to_string());
        }

        match err {
            E::Cancelled => ExecError::Cancelled,
            E::IoError(e) => ExecError::LocalIo(e.to_string()),
            E::RemoteIo(e) => ExecError::remote(None, e.to_string()),
            E::SshError(russh::Error::Disconnect) | E::SshError(russh::Error::HUP) => {
                ExecError::TransportDropped(err.to_string())
            }
            E::SftpError(e) => ExecError::remote(None, sftp_message(&e)),
            other => ExecError::remote(None, other.to_string()),
        }
    }
}

fn sftp_message(err: &russh_sftp::client::error::Error) -> String {
    match err {
        russh_sftp::client::error::Error::Status(status) => {
            format!("{:?}: {}", status.status_code, status.error_message)
        }
        other => other.to_string(),
    }
}
