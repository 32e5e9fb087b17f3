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

//! Picking an authentication method for the CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::session::{ConnectTarget, Credential};

/// Default private key names tried in order when nothing else is given.
const DEFAULT_KEY_NAMES: &[&str] = &["id_ed25519", "id_rsa", "id_ecdsa"];

pub struct CredentialResolver<'a> {
    target: &'a ConnectTarget,
    key_path: Option<PathBuf>,
    use_agent: bool,
    use_password: bool,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(
        target: &'a ConnectTarget,
        key_path: Option<PathBuf>,
        use_agent: bool,
        use_password: bool,
    ) -> Self {
        Self {
            target,
            key_path,
            use_agent,
            use_password,
        }
    }

    /// Resolve in priority order: password, key file, agent, default keys.
    ///
    /// Without an explicit choice the agent is used when `SSH_AUTH_SOCK` is
    /// set and no default key exists.
    pub fn resolve(&self) -> Result<Credential> {
        if self.use_password {
            return self.password_auth();
        }

        if let Some(ref key_path) = self.key_path {
            return self.key_file_auth(key_path);
        }

        if self.use_agent {
            return self.agent_auth();
        }

        if let Some(key) = Self::default_key() {
            return self.key_file_auth(&key);
        }

        if std::env::var("SSH_AUTH_SOCK").is_ok() {
            tracing::debug!("No default key found, falling back to SSH agent");
            return Ok(Credential::Agent);
        }

        anyhow::bail!(
            "SSH authentication failed: No authentication method available.\n             \n             Solutions:\n             - Use --password for password authentication\n             - Start SSH agent and add keys with 'ssh-add'\n             - Specify a key file with -i/--identity\n             - Create a default key at ~/.ssh/id_ed25519 or ~/.ssh/id_rsa"
        )
    }

    fn password_auth(&self) -> Result<Credential> {
        tracing::debug!("Using password authentication");
        let password = Zeroizing::new(
            rpassword::prompt_password(format!("Enter password for {}: ", self.target))
                .with_context(|| "Failed to read password")?,
        );
        Ok(Credential::Password(password))
    }

    #[cfg(not(target_os = "windows"))]
    fn agent_auth(&self) -> Result<Credential> {
        if std::env::var("SSH_AUTH_SOCK").is_err() {
            anyhow::bail!("SSH agent requested but SSH_AUTH_SOCK environment variable not set");
        }
        tracing::debug!("Using SSH agent for authentication");
        Ok(Credential::Agent)
    }

    #[cfg(target_os = "windows")]
    fn agent_auth(&self) -> Result<Credential> {
        anyhow::bail!("SSH agent authentication is not supported on Windows");
    }

    fn key_file_auth(&self, key_path: &Path) -> Result<Credential> {
        tracing::debug!("Authenticating with key: {:?}", key_path);

        let key_contents = std::fs::read_to_string(key_path)
            .with_context(|| format!("Failed to read SSH key file: {key_path:?}"))?;

        let passphrase = if is_encrypted_key(&key_contents) {
            tracing::debug!("Detected encrypted SSH key, prompting for passphrase");
            Some(Zeroizing::new(
                rpassword::prompt_password(format!("Enter passphrase for key {key_path:?}: "))
                    .with_context(|| "Failed to read passphrase")?,
            ))
        } else {
            None
        };

        Ok(Credential::KeyFile {
            path: key_path.to_path_buf(),
            passphrase,
        })
    }

    fn default_key() -> Option<PathBuf> {
        let home = directories::BaseDirs::new()?.home_dir().join(".ssh");
        DEFAULT_KEY_NAMES
            .iter()
            .map(|name| home.join(name))
            .find(|path| path.exists())
    }
}

/// PEM-encrypted keys say so in their header.
fn is_encrypted_key(contents: &str) -> bool {
    contents.contains("ENCRYPTED")
}
