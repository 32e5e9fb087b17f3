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

use std::io;
use thiserror::Error;

/// Errors raised by the low-level SSH client.
///
/// Close to what russh reports. The session layer classifies them into
/// connect and execution failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Key authentication failed")]
    KeyAuthFailed,
    #[error("Unable to load key, bad format or passphrase: {0}")]
    KeyInvalid(russh::keys::Error),
    #[error("Password authentication failed")]
    PasswordWrong,
    #[error("Failed to connect to SSH agent")]
    AgentConnectionFailed,
    #[error("Failed to request identities from SSH agent")]
    AgentRequestIdentitiesFailed,
    #[error("SSH agent has no identities")]
    AgentNoIdentities,
    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,
    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),
    #[error("The executed command didn't send an exit code")]
    CommandDidntExit,
    #[error("Server check failed")]
    ServerCheckFailed,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Ssh error occured: {0}")]
    SshError(#[from] russh::Error),
    #[error("Sftp error occured: {0}")]
    SftpError(#[from] russh_sftp::client::error::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    /// Reading or writing the remote file of an SFTP copy failed.
    #[error("Remote I/O error: {0}")]
    RemoteIo(io::Error),
}

impl Error {
    /// True when the failure came from credentials being refused rather than
    /// from the network or the protocol.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::KeyAuthFailed
                | Error::KeyInvalid(_)
                | Error::PasswordWrong
                | Error::AgentConnectionFailed
                | Error::AgentRequestIdentitiesFailed
                | Error::AgentNoIdentities
                | Error::AgentAuthenticationFailed
        )
    }
}
