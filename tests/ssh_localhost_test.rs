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

//! End-to-end checks against a real sshd on localhost.
//!
//! Every test returns early when `ssh localhost` does not work
//! non-interactively with the agent.

use remsh::session::{ConnectTarget, Credential, Session, SessionOptions, SshConnector};
use remsh::ssh::tokio_client::ServerCheckMethod;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Check if SSH is available and can connect to localhost
fn can_ssh_to_localhost() -> bool {
    use std::process::Command;

    let output = Command::new("ssh")
        .args([
            "-o",
            "ConnectTimeout=2",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "PasswordAuthentication=no",
            "-o",
            "BatchMode=yes",
            "localhost",
            "echo",
            "test",
        ])
        .output();

    match output {
        Ok(result) => result.status.success(),
        Err(_) => false,
    }
}

async fn localhost_session() -> Option<Arc<Session>> {
    if !can_ssh_to_localhost() {
        eprintln!("Skipping: cannot SSH to localhost");
        return None;
    }
    let username = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
    let session = Arc::new(Session::new(
        Arc::new(SshConnector::new(ServerCheckMethod::NoCheck)),
        SessionOptions {
            connect_timeout: Some(Duration::from_secs(5)),
        },
    ));
    let target = ConnectTarget::new("localhost", 22, username);
    if let Err(e) = session.connect(&target, Credential::Agent).await {
        eprintln!("Skipping: cannot connect to localhost: {e}");
        return None;
    }
    Some(session)
}

#[tokio::test]
async fn test_localhost_execute() {
    let Some(session) = localhost_session().await else {
        return;
    };

    let output = session.execute("echo 'hello from remsh'").await.unwrap();
    assert_eq!(output.trim(), "hello from remsh");

    let (stdout, stderr) = session
        .execute_split("echo out; echo err >&2")
        .await
        .unwrap();
    assert_eq!(stdout.trim(), "out");
    assert_eq!(stderr.trim(), "err");

    assert!(session.execute("exit 3").await.is_err());
    assert!(session.is_connected());
    session.disconnect().await;
}

#[tokio::test]
async fn test_localhost_streaming_cancel() {
    let Some(session) = localhost_session().await else {
        return;
    };

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stopper.cancel();
    });

    let result = session
        .execute_streaming(
            "while true; do echo tick; sleep 0.2; done",
            move |line| sink.lock().unwrap().push(line),
            &cancel,
        )
        .await;

    assert!(result.is_ok());
    let lines = lines.lock().unwrap();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|line| line == "tick"));
    session.disconnect().await;
}
