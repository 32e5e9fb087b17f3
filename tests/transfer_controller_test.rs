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

mod common;

use common::connected_session;
use remsh::session::ExecError;
use remsh::transfer::{
    Direction, ItemOutcome, TransferController, TransferError, TransferEvent, TransferItem,
    TransferOptions,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

fn write_local(dir: &Path, name: &str, contents: &[u8]) -> TransferItem {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    TransferItem::new(path, format!("/srv/{name}"))
}

fn drain(rx: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn fast_options() -> TransferOptions {
    TransferOptions {
        progress_interval: Duration::ZERO,
        ..TransferOptions::default()
    }
}

#[tokio::test]
async fn test_upload_batch_completes_in_order() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.txt", b"alpha contents"),
        write_local(dir.path(), "b.txt", b"bravo"),
        write_local(dir.path(), "c.txt", b""),
    ];
    let (controller, mut rx) = TransferController::new(session, fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.bytes_transferred(), 19);
    assert_eq!(
        transport.remote_file("/srv/a.txt").unwrap(),
        b"alpha contents".to_vec()
    );
    assert_eq!(
        transport.started_copies(),
        vec!["/srv/a.txt", "/srv/b.txt", "/srv/c.txt"]
    );

    let events = drain(&mut rx);
    let finished: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::ItemFinished { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![0, 1, 2]);
    assert!(matches!(events.last(), Some(TransferEvent::BatchFinished(_))));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TransferEvent::BatchFinished(_)))
            .count(),
        1
    );
    assert!(!controller.is_running());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_total() {
    let (session, _transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "one.bin", &[1u8; 37]),
        write_local(dir.path(), "two.bin", &[2u8; 18]),
    ];
    let (controller, mut rx) = TransferController::new(session, fast_options());

    controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();

    let mut ticks: HashMap<usize, Vec<(u64, Option<u64>)>> = HashMap::new();
    for event in drain(&mut rx) {
        if let TransferEvent::Progress(progress) = event {
            assert!(progress.rate >= 0.0);
            ticks
                .entry(progress.index)
                .or_default()
                .push((progress.transferred, progress.total));
        }
    }

    for (index, expected) in [(0usize, 37u64), (1, 18)] {
        let item_ticks = &ticks[&index];
        assert!(item_ticks
            .windows(2)
            .all(|pair| pair[0].0 <= pair[1].0));
        assert!(item_ticks
            .iter()
            .all(|(done, total)| total.map_or(true, |t| *done <= t)));
        // Only the final tick reaches the total.
        let complete: Vec<_> = item_ticks.iter().filter(|(done, _)| *done == expected).collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(item_ticks.last(), Some(&(expected, Some(expected))));
    }
}

#[tokio::test]
async fn test_batch_runs_without_event_receiver() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.bin", &[7u8; 21]),
        write_local(dir.path(), "b.bin", b"b"),
    ];
    let (controller, rx) = TransferController::new(session, fast_options());
    drop(rx);

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.bytes_transferred(), 22);
    assert_eq!(transport.remote_file("/srv/a.bin").unwrap(), vec![7u8; 21]);
    assert!(!controller.is_running());
}

#[tokio::test]
async fn test_directories_are_skipped() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    let items = vec![
        TransferItem::new(dir.path().join("nested"), "/srv/nested"),
        write_local(dir.path(), "file.txt", b"data"),
    ];
    let (controller, _rx) = TransferController::new(session.clone(), fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();
    assert_eq!(summary.outcomes[0], ItemOutcome::Skipped);
    assert_eq!(summary.outcomes[1], ItemOutcome::Completed { bytes: 4 });
    assert!(summary.is_success());

    transport.add_remote_dir("/srv/logs");
    let summary = controller
        .run_batch(
            vec![TransferItem::new(dir.path().join("logs"), "/srv/logs")],
            Direction::Download,
        )
        .await
        .unwrap();
    assert_eq!(summary.outcomes, vec![ItemOutcome::Skipped]);
    assert!(!dir.path().join("logs").exists());
}

#[tokio::test]
async fn test_failed_item_does_not_stop_batch() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.txt", b"aaaa"),
        write_local(dir.path(), "b.txt", b"bbbbbbbb"),
        write_local(dir.path(), "c.txt", b"cccc"),
    ];
    transport.fail_copy("/srv/b.txt", ExecError::remote(None, "PermissionDenied: denied"));
    let (controller, _rx) = TransferController::new(session.clone(), fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert!(matches!(&summary.outcomes[1], ItemOutcome::Failed(reason) if reason.contains("denied")));
    assert!(summary.aborted.is_none());
    assert!(!summary.is_success());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_missing_local_file_fails_item() {
    let (session, _transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        TransferItem::new(dir.path().join("absent.txt"), "/srv/absent.txt"),
        write_local(dir.path(), "present.txt", b"here"),
    ];
    let (controller, _rx) = TransferController::new(session, fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();
    assert!(matches!(summary.outcomes[0], ItemOutcome::Failed(_)));
    assert_eq!(summary.outcomes[1], ItemOutcome::Completed { bytes: 4 });
}

#[tokio::test]
async fn test_download_batch_writes_local_files() {
    let (session, transport) = connected_session().await;
    transport.add_remote_file("/var/log/app.log", b"log line\n");
    let dir = TempDir::new().unwrap();
    let items = vec![
        TransferItem::new(dir.path().join("sub/app.log"), "/var/log/app.log"),
        TransferItem::new(dir.path().join("missing.log"), "/var/log/missing.log"),
    ];
    let (controller, _rx) = TransferController::new(session, fast_options());

    let summary = controller
        .run_batch(items, Direction::Download)
        .await
        .unwrap();

    assert_eq!(summary.outcomes[0], ItemOutcome::Completed { bytes: 9 });
    assert!(matches!(summary.outcomes[1], ItemOutcome::Failed(_)));
    assert_eq!(
        std::fs::read(dir.path().join("sub/app.log")).unwrap(),
        b"log line\n"
    );
}

#[tokio::test]
async fn test_cancel_stops_before_next_item() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    // 100 chunks of 10ms each per file.
    let items = vec![
        write_local(dir.path(), "a.bin", &[0u8; 400]),
        write_local(dir.path(), "b.bin", &[0u8; 400]),
        write_local(dir.path(), "c.bin", &[0u8; 400]),
    ];
    let (controller, mut rx) = TransferController::new(session, fast_options());
    let controller = Arc::new(controller);

    let handle = controller
        .start_batch(items, Direction::Upload)
        .unwrap();
    assert!(controller.is_running());

    loop {
        match rx.recv().await.unwrap() {
            TransferEvent::ItemStarted { index: 0, .. } => break,
            _ => continue,
        }
    }
    assert!(controller.cancel_batch());

    let summary = handle.await.unwrap();
    assert_eq!(
        summary.outcomes,
        vec![
            ItemOutcome::Cancelled,
            ItemOutcome::NotStarted,
            ItemOutcome::NotStarted
        ]
    );
    assert!(summary.was_cancelled());
    assert_eq!(transport.started_copies(), vec!["/srv/a.bin"]);
    assert!(!controller.is_running());
    assert!(!controller.cancel_batch());
}

#[tokio::test]
async fn test_item_error_after_cancel_counts_as_cancelled() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.bin", &[0u8; 64]),
        write_local(dir.path(), "b.bin", b"bbbb"),
    ];
    transport.fail_copy("/srv/a.bin", ExecError::remote(None, "PermissionDenied: denied"));
    let (controller, mut rx) = TransferController::new(session.clone(), fast_options());
    let controller = Arc::new(controller);

    let handle = controller.start_batch(items, Direction::Upload).unwrap();
    loop {
        if let TransferEvent::ItemStarted { index: 0, .. } = rx.recv().await.unwrap() {
            break;
        }
    }
    assert!(controller.cancel_batch());

    let summary = handle.await.unwrap();
    assert_eq!(
        summary.outcomes,
        vec![ItemOutcome::Cancelled, ItemOutcome::NotStarted]
    );
    assert_eq!(summary.failed, 0);
    assert!(summary.aborted.is_none());
    assert!(summary.was_cancelled());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_download_with_unknown_size_reports_open_progress() {
    let (session, transport) = connected_session().await;
    let contents = b"streamed without a size\n";
    transport.add_remote_file_unsized("/proc/app/status", contents);
    let dir = TempDir::new().unwrap();
    let items = vec![TransferItem::new(dir.path().join("status"), "/proc/app/status")];
    let (controller, mut rx) = TransferController::new(session, fast_options());

    let summary = controller
        .run_batch(items, Direction::Download)
        .await
        .unwrap();
    let expected = contents.len() as u64;
    assert_eq!(
        summary.outcomes,
        vec![ItemOutcome::Completed { bytes: expected }]
    );
    assert_eq!(std::fs::read(dir.path().join("status")).unwrap(), contents);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        TransferEvent::ItemStarted {
            index: 0,
            total_bytes: None
        }
    )));
    let ticks: Vec<(u64, Option<u64>)> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress(p) => Some((p.transferred, p.total)),
            _ => None,
        })
        .collect();
    assert!(ticks.len() > 1);
    assert!(ticks.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    let (last, open) = ticks.split_last().unwrap();
    assert!(open.iter().all(|(_, total)| total.is_none()));
    assert_eq!(*last, (expected, Some(expected)));
}

#[tokio::test]
async fn test_connection_loss_aborts_batch() {
    let (session, transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.txt", b"aaaa"),
        write_local(dir.path(), "b.txt", b"bbbbbbbb"),
        write_local(dir.path(), "c.txt", b"cccc"),
    ];
    transport.fail_copy(
        "/srv/b.txt",
        ExecError::TransportDropped("connection reset".into()),
    );
    let (controller, mut rx) = TransferController::new(session.clone(), fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();

    assert_eq!(summary.outcomes[0], ItemOutcome::Completed { bytes: 4 });
    assert!(matches!(summary.outcomes[1], ItemOutcome::Failed(_)));
    assert_eq!(summary.outcomes[2], ItemOutcome::NotStarted);
    assert!(summary.aborted.is_some());
    assert!(!summary.was_cancelled());
    assert!(!session.is_connected());
    assert_eq!(transport.started_copies(), vec!["/srv/a.txt", "/srv/b.txt"]);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, TransferEvent::ItemStarted { index: 2, .. })));
}

#[tokio::test]
async fn test_second_batch_rejected_while_running() {
    let (session, _transport) = connected_session().await;
    let dir = TempDir::new().unwrap();
    let first = vec![write_local(dir.path(), "big.bin", &[0u8; 200])];
    let second = vec![write_local(dir.path(), "small.bin", b"x")];
    let (controller, _rx) = TransferController::new(session, fast_options());
    let controller = Arc::new(controller);

    let handle = controller.start_batch(first, Direction::Upload).unwrap();
    let err = controller
        .run_batch(second.clone(), Direction::Upload)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::BatchInProgress);

    assert!(handle.await.unwrap().is_success());
    let summary = controller
        .run_batch(second, Direction::Upload)
        .await
        .unwrap();
    assert!(summary.is_success());
}

#[tokio::test]
async fn test_batch_without_connection_aborts() {
    let (session, _transport) = connected_session().await;
    session.disconnect().await;
    let dir = TempDir::new().unwrap();
    let items = vec![
        write_local(dir.path(), "a.txt", b"a"),
        write_local(dir.path(), "b.txt", b"b"),
    ];
    let (controller, _rx) = TransferController::new(session, fast_options());

    let summary = controller
        .run_batch(items, Direction::Upload)
        .await
        .unwrap();
    assert!(summary.aborted.is_some());
    assert_eq!(summary.outcomes[1], ItemOutcome::NotStarted);
}
