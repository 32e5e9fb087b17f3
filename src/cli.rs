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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "remsh",
    version,
    about = "Remote session shell - commands, live tail and file transfer over one SSH connection",
    long_about = "remsh opens a single authenticated SSH connection and runs one operation over it:\na command, a live tail of a growing remote file, or a batch of SFTP transfers.\nAuthentication uses a key file, the SSH agent, or a password prompt.",
    after_help = "EXAMPLES:\n  Run a command:           remsh admin@db1 exec uptime\n  Split stdout/stderr:     remsh db1 exec --split -- ls /missing /tmp\n  Follow a log:            remsh db1 tail -n 200 /var/log/syslog\n  Upload files:            remsh db1 upload app.tar.gz notes.txt /srv/incoming\n  Download files:          remsh db1 download /etc/hosts /etc/fstab ./backup"
)]
pub struct Cli {
    #[arg(help = "Remote host in [user@]hostname[:port] format")]
    pub destination: String,

    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/remsh/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'l', long, help = "Login name (overrides config)")]
    pub user: Option<String>,

    #[arg(short = 'p', long, help = "Port to connect to (overrides config)")]
    pub port: Option<u16>,

    #[arg(
        short = 'i',
        long,
        help = "SSH private key file path (prompts for passphrase if encrypted)\nFalls back to default keys (~/.ssh/id_ed25519, ~/.ssh/id_rsa, etc.) if not specified"
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'A',
        long,
        help = "Use SSH agent for authentication (Unix/Linux/macOS only)"
    )]
    pub use_agent: bool,

    #[arg(
        short = 'P',
        long,
        help = "Use password authentication (will prompt for password)"
    )]
    pub password: bool,

    #[arg(
        long,
        help = "Host key checking mode (yes/no/KNOWN_HOSTS_PATH) [default: yes]\n  yes  - Strict checking against ~/.ssh/known_hosts\n  no   - Accept all host keys (insecure, testing only)\n  PATH - Check against the given known_hosts file"
    )]
    pub strict_host_key_checking: Option<String>,

    #[arg(
        long,
        help = "Connection timeout in seconds (0 for unlimited) [default: 30]"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a command",
        long_about = "Runs the command to completion and prints its output.\nStdout and stderr are printed interleaved unless --split is given.\n\nExit codes: 0 (success), 1 (connection failure or non-zero remote exit)"
    )]
    Exec {
        #[arg(long, help = "Print stdout and stderr separately")]
        split: bool,

        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    #[command(
        about = "Follow a growing remote file",
        long_about = "Prints the last lines of the file, then follows it until Ctrl-C.\nThe stream ends with an error if the file is removed."
    )]
    Tail {
        #[arg(short = 'n', long, help = "Initial window size in lines [default: from config, 100]")]
        lines: Option<usize>,

        #[arg(help = "Remote file path")]
        path: String,
    },

    #[command(
        about = "Upload local files to a remote directory",
        long_about = "Uploads each file in order over SFTP. Directories are skipped.\nCtrl-C stops after the current chunk; partial files are left in place.\n\nRequirements: Remote SSH server must have the SFTP subsystem enabled."
    )]
    Upload {
        #[arg(required = true, num_args = 1.., help = "Local files")]
        sources: Vec<PathBuf>,

        #[arg(help = "Remote destination directory")]
        destination: String,
    },

    #[command(
        about = "Download remote files to a local directory",
        long_about = "Downloads each file in order over SFTP. Directories are skipped.\nThe destination directory is created if it doesn't exist.\nCtrl-C stops after the current chunk; partial files are left in place."
    )]
    Download {
        #[arg(required = true, num_args = 1.., help = "Remote files")]
        sources: Vec<String>,

        #[arg(help = "Local destination directory")]
        destination: PathBuf,
    },
}
