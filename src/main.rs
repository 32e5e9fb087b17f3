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

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;

use remsh::{
    cli::{Cli, Commands},
    commands::{
        credential::CredentialResolver,
        exec::execute_command,
        tail::tail_file,
        transfer::{download_items, run_transfer, upload_items},
    },
    config::{parse_host_key_checking, Config},
    session::{ConnectTarget, Session, SshConnector},
    transfer::Direction,
    utils::init_logging,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_with_priority(cli.config.as_deref()).await?;

    let target = ConnectTarget::parse(
        &cli.destination,
        cli.user.as_deref().or(config.defaults.user.as_deref()),
        cli.port.or(config.defaults.port),
    )?;

    let host_key_mode = cli
        .strict_host_key_checking
        .as_deref()
        .or(config.defaults.strict_host_key_checking.as_deref())
        .unwrap_or("yes");
    let server_check = parse_host_key_checking(host_key_mode)?;

    let mut session_options = config.defaults.session_options();
    if let Some(seconds) = cli.connect_timeout {
        session_options.connect_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    let identity = cli
        .identity
        .clone()
        .or_else(|| config.defaults.identity_path());
    let credential =
        CredentialResolver::new(&target, identity, cli.use_agent, cli.password).resolve()?;

    let connector = SshConnector::new(server_check)
        .with_keepalive(config.defaults.keepalive())
        .with_chunk_size(config.transfer.chunk_size);
    let session = Arc::new(Session::new(Arc::new(connector), session_options));

    session
        .connect(&target, credential)
        .await
        .with_context(|| format!("Failed to connect to {target}"))?;

    let result = match cli.command {
        Commands::Exec { split, command } => {
            execute_command(Arc::clone(&session), &command.join(" "), split).await
        }
        Commands::Tail { lines, path } => {
            let lines = lines.unwrap_or(config.tail.default_lines);
            tail_file(Arc::clone(&session), &config.tail, &path, lines).await
        }
        Commands::Upload {
            sources,
            destination,
        } => {
            let items = upload_items(&sources, &destination)?;
            run_transfer(
                Arc::clone(&session),
                config.transfer.options(),
                items,
                Direction::Upload,
            )
            .await
        }
        Commands::Download {
            sources,
            destination,
        } => {
            let items = download_items(&sources, &destination)?;
            run_transfer(
                Arc::clone(&session),
                config.transfer.options(),
                items,
                Direction::Download,
            )
            .await
        }
    };

    session.disconnect().await;
    result
}
