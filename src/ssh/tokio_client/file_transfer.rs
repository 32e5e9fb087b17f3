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

//! SFTP byte-copy primitives.
//!
//! Files are copied in fixed-size chunks. After every chunk the progress
//! callback receives `(transferred, total)` and the cancellation token is
//! checked; a cancelled copy stops there and leaves the partial destination
//! as it is.
//!
//! The remote side must have the sftp subsystem enabled
//! (`Subsystem sftp internal-sftp` or similar in sshd_config).

use russh_sftp::{client::SftpSession, protocol::OpenFlags};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::connection::Client;

/// Progress callback: `(transferred_bytes, total_bytes_if_known)`.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// What the remote side reports about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: Option<u64>,
}

impl Client {
    async fn open_sftp(&self) -> Result<SftpSession, super::Error> {
        let channel = self.get_channel().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }

    /// Stat a remote path.
    pub async fn remote_metadata(&self, remote_path: &str) -> Result<RemoteMetadata, super::Error> {
        let sftp = self.open_sftp().await?;
        let metadata = sftp.metadata(remote_path).await?;
        let _ = sftp.close().await;
        Ok(RemoteMetadata {
            is_dir: metadata.file_type().is_dir(),
            size: metadata.size,
        })
    }

    /// Upload a local file, truncating the remote destination.
    ///
    /// Returns the number of bytes written.
    pub async fn upload_file_with_progress(
        &self,
        src_file_path: &Path,
        dest_file_path: &str,
        chunk_size: usize,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, super::Error> {
        let mut local_file = tokio::fs::File::open(src_file_path).await?;
        let total = local_file.metadata().await?.len();

        let sftp = self.open_sftp().await?;
        let mut remote_file = sftp
            .open_with_flags(
                dest_file_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;

        progress(0, Some(total));

        let mut buffer = vec![0u8; chunk_size.max(1)];
        let mut transferred = 0u64;
        loop {
            let n = local_file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            remote_file
                .write_all(&buffer[..n])
                .await
                .map_err(super::Error::RemoteIo)?;
            transferred += n as u64;
            progress(transferred, Some(total));

            if cancel.is_cancelled() {
                tracing::debug!(
                    "Upload of {:?} cancelled after {} bytes",
                    src_file_path,
                    transferred
                );
                let _ = remote_file.shutdown().await;
                let _ = sftp.close().await;
                return Err(super::Error::Cancelled);
            }
        }

        remote_file.flush().await.map_err(super::Error::RemoteIo)?;
        remote_file
            .shutdown()
            .await
            .map_err(super::Error::RemoteIo)?;
        let _ = sftp.close().await;

        Ok(transferred)
    }

    /// Download a remote file, creating or truncating the local destination
    /// and any missing parent directories.
    ///
    /// The total is taken from the remote metadata when the server reports a
    /// size; otherwise it stays unknown and only `transferred` advances.
    pub async fn download_file_with_progress(
        &self,
        remote_file_path: &str,
        local_file_path: &Path,
        chunk_size: usize,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, super::Error> {
        let sftp = self.open_sftp().await?;
        let total = match sftp.metadata(remote_file_path).await {
            Ok(metadata) => metadata.size,
            Err(e) => {
                tracing::debug!("Could not stat {}: {:?}", remote_file_path, e);
                None
            }
        };

        let mut remote_file = sftp
            .open_with_flags(remote_file_path, OpenFlags::READ)
            .await?;

        if let Some(parent) = local_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut local_file = tokio::fs::File::create(local_file_path).await?;

        progress(0, total);

        let mut buffer = vec![0u8; chunk_size.max(1)];
        let mut transferred = 0u64;
        loop {
            let n = remote_file
                .read(&mut buffer)
                .await
                .map_err(super::Error::RemoteIo)?;
            if n == 0 {
                break;
            }
            local_file.write_all(&buffer[..n]).await?;
            transferred += n as u64;
            progress(transferred, total);

            if cancel.is_cancelled() {
                tracing::debug!(
                    "Download of {} cancelled after {} bytes",
                    remote_file_path,
                    transferred
                );
                let _ = local_file.flush().await;
                let _ = sftp.close().await;
                return Err(super::Error::Cancelled);
            }
        }

        local_file.flush().await?;
        let _ = sftp.close().await;

        Ok(transferred)
    }
}
