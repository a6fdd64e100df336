//! Tests for reading events from a byte stream.

use std::io;

use codex_sdk::exec::{EventReader, RunError, ThreadEvent};
use tokio::io::BufReader;
use tokio_test::io::Builder;

#[tokio::test]
async fn reader_joins_lines_split_across_reads() {
    let mock = Builder::new()
        .read(b"{\"type\":\"thread.sta")
        .read(b"rted\",\"thread_id\":\"t1\"}\n{\"type\":")
        .read(b"\"turn.started\"}\n")
        .build();
    let mut reader = EventReader::new(BufReader::new(mock));

    let first = reader.next_event().await.unwrap().unwrap();
    assert_eq!(first.thread_id(), Some("t1"));
    assert_eq!(
        reader.next_event().await.unwrap(),
        Some(ThreadEvent::TurnStarted)
    );
    assert!(reader.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn reader_skips_blank_lines() {
    let mock = Builder::new()
        .read(b"\n   \n")
        .read(b"{\"type\":\"turn.started\"}\n\n")
        .build();
    let mut reader = EventReader::new(BufReader::new(mock));

    assert_eq!(
        reader.next_event().await.unwrap(),
        Some(ThreadEvent::TurnStarted)
    );
    assert!(reader.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn reader_accepts_final_line_without_newline() {
    let mock = Builder::new().read(b"{\"type\":\"turn.started\"}").build();
    let mut reader = EventReader::new(BufReader::new(mock));

    assert_eq!(
        reader.next_event().await.unwrap(),
        Some(ThreadEvent::TurnStarted)
    );
    assert!(reader.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn reader_reports_malformed_line() {
    let mock = Builder::new()
        .read(b"{\"type\":\"turn.started\"}\n{oops\n")
        .build();
    let mut reader = EventReader::new(BufReader::new(mock));

    assert!(reader.next_event().await.unwrap().is_some());
    match reader.next_event().await {
        Err(RunError::Decode(err)) => assert_eq!(err.input, "{oops"),
        other => panic!("Expected Decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn reader_reports_read_failure() {
    let mock = Builder::new()
        .read(b"{\"type\":\"turn.started\"}\n")
        .read_error(io::Error::other("pipe gone"))
        .build();
    let mut reader = EventReader::new(BufReader::new(mock));

    assert!(reader.next_event().await.unwrap().is_some());
    match reader.next_event().await {
        Err(RunError::Io(err)) => assert_eq!(err.to_string(), "pipe gone"),
        other => panic!("Expected Io error, got {other:?}"),
    }
}

#[tokio::test]
async fn reader_reports_invalid_utf8_as_decode_error() {
    let mock = Builder::new()
        .read(b"\xff\xfe\n")
        .read(b"{\"type\":\"turn.started\"}\n")
        .build();
    let mut reader = EventReader::new(BufReader::new(mock));

    match reader.next_event().await {
        Err(RunError::Decode(err)) => {
            assert_eq!(err.input, "\u{fffd}\u{fffd}");
            assert!(err.reason.contains("utf-8"));
        }
        other => panic!("Expected Decode error, got {other:?}"),
    }
    assert_eq!(
        reader.next_event().await.unwrap(),
        Some(ThreadEvent::TurnStarted)
    );
    assert!(reader.next_event().await.unwrap().is_none());
}
