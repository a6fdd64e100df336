//! End-to-end turn tests against a fake `codex` binary.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use codex_sdk::exec::{CancelPoint, ThreadEvent, ThreadItem};
use codex_sdk::{Codex, Input, RunError, ThreadOptions, TurnOptions, Usage, UserInput};
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::support::FakeCodex;

const THREAD_STARTED: &str = r#"{"type":"thread.started","thread_id":"t1"}"#;
const TURN_STARTED: &str = r#"{"type":"turn.started"}"#;
const HI: &str = r#"{"type":"item.completed","item":{"id":"i1","type":"agent_message","text":"Hi!"}}"#;
const TURN_COMPLETED: &str = r#"{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":2,"output_tokens":3}}"#;

const LIMIT: Duration = Duration::from_secs(10);

fn agent_message(id: &str, text: &str) -> String {
    json!({"type": "item.completed", "item": {"id": id, "type": "agent_message", "text": text}})
        .to_string()
}

#[tokio::test]
async fn run_collects_items_response_and_usage() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, TURN_STARTED, HI, TURN_COMPLETED]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let result = thread.run("Say hi", TurnOptions::new()).await.unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id(), "i1");
    assert_eq!(result.final_response, "Hi!");
    assert_eq!(result.usage, Some(Usage::new(10, 2, 3)));
    assert_eq!(thread.id(), Some("t1"));
    assert_eq!(fake.recorded_stdin(), "Say hi");
    assert_eq!(fake.recorded_args(), vec!["exec", "--experimental-json"]);
}

#[tokio::test]
async fn run_without_turn_completed_has_no_usage() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, HI]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let result = thread.run("hi", TurnOptions::new()).await.unwrap();
    assert_eq!(result.final_response, "Hi!");
    assert!(result.usage.is_none());
}

#[tokio::test]
async fn last_agent_message_is_final_response() {
    let first = agent_message("i1", "A");
    let second = agent_message("i2", "B");
    let fake = FakeCodex::ok(&[THREAD_STARTED, &first, &second, TURN_COMPLETED]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let result = thread.run("hi", TurnOptions::new()).await.unwrap();
    assert_eq!(result.final_response, "B");
    assert_eq!(result.items.len(), 2);
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let fake = FakeCodex::ok(&["", THREAD_STARTED, "   ", HI, "", TURN_COMPLETED, ""]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let result = thread.run("hi", TurnOptions::new()).await.unwrap();
    assert_eq!(result.final_response, "Hi!");
}

#[tokio::test]
async fn nonzero_exit_reports_code_and_stderr() {
    let fake = FakeCodex::new(&[], "boom", 1);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    match &err {
        RunError::ProcessFailed { code, stderr } => {
            assert_eq!(*code, Some(1));
            assert_eq!(stderr, "boom");
        }
        other => panic!("Expected ProcessFailed, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("boom"));
    assert!(message.contains('1'));
}

#[tokio::test]
async fn nonzero_exit_after_events_fails_turn() {
    let fake = FakeCodex::new(&[THREAD_STARTED, HI], "crashed", 2);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    assert!(matches!(err, RunError::ProcessFailed { code: Some(2), .. }));
    assert_eq!(thread.id(), Some("t1"));
}

#[tokio::test]
async fn turn_failed_is_reported_with_message() {
    let fake = FakeCodex::ok(&[
        THREAD_STARTED,
        r#"{"type":"turn.failed","error":{"message":"m"}}"#,
    ]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    assert!(err.is_turn_failure());
    assert_eq!(err.to_string(), "m");
}

#[tokio::test]
async fn turn_failed_wins_over_exit_status() {
    let fake = FakeCodex::new(
        &[r#"{"type":"turn.failed","error":{"message":"rate limited"}}"#],
        "exiting",
        1,
    );
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    match err {
        RunError::TurnFailed { message } => assert_eq!(message, "rate limited"),
        other => panic!("Expected TurnFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn thread_error_event_fails_turn() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, r#"{"type":"error","message":"disconnected"}"#]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    assert!(matches!(err, RunError::TurnFailed { ref message } if message == "disconnected"));
}

#[tokio::test]
async fn malformed_line_is_decode_error() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, "{not json", HI]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    match err {
        RunError::Decode(decode) => assert_eq!(decode.input, "{not json"),
        other => panic!("Expected Decode, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_before_start_terminates_process() {
    // Only reached if the shell outlives its stdin.
    let fake = FakeCodex::with_body("echo alive > \"$here/survived.txt\"\n");
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());
    let token = CancellationToken::new();
    token.cancel();

    let started = Instant::now();
    let err = tokio::time::timeout(
        LIMIT,
        thread.run("hi", TurnOptions::new().with_cancellation(token)),
    )
    .await
    .expect("cancelled run should resolve promptly")
    .unwrap_err();

    assert!(matches!(err, RunError::Cancelled(CancelPoint::BeforeStart)));
    assert!(started.elapsed() < LIMIT);
    assert!(thread.id().is_none());

    // stdin is closed once the turn is dropped; a surviving shell would
    // now finish its script.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!fake.dir().join("survived.txt").exists());
    assert_eq!(fake.recorded_stdin(), "");
}

#[tokio::test]
async fn cancel_while_streaming_stops_turn() {
    let fake = FakeCodex::with_body(&format!(
        "trap 'echo TERM > \"$here/term.txt\"; exit 143' TERM\n\
         cat <<'__EVENTS__'\n{THREAD_STARTED}\n__EVENTS__\n\
         sleep 30 &\n\
         wait $!\n"
    ));
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());
    let token = CancellationToken::new();

    let mut turn = thread
        .run_streamed("hi", TurnOptions::new().with_cancellation(token.clone()))
        .await
        .unwrap();

    let first = turn.next_event().await.unwrap().unwrap();
    assert_eq!(first.thread_id(), Some("t1"));

    token.cancel();
    let next = tokio::time::timeout(LIMIT, turn.next_event())
        .await
        .expect("cancellation should interrupt the read");
    match next {
        Some(Err(RunError::Cancelled(point))) => assert_eq!(point, CancelPoint::Streaming),
        other => panic!("Expected Cancelled, got {other:?}"),
    }
    assert!(turn.next_event().await.is_none());
    assert!(fake.dir().join("term.txt").exists());
}

#[tokio::test]
async fn invalid_utf8_output_is_decode_error() {
    let fake = FakeCodex::with_body("printf '\\377\\376\\n'\n");
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    assert!(matches!(err, RunError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn resumed_thread_passes_resume_args() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, HI, TURN_COMPLETED]);
    let codex = Codex::new(&fake.options());
    let mut thread = codex.start_thread(ThreadOptions {
        model: Some("gpt-5-codex".to_string()),
        ..ThreadOptions::default()
    });

    thread.run("first", TurnOptions::new()).await.unwrap();
    assert_eq!(
        fake.recorded_args(),
        vec!["exec", "--experimental-json", "--model", "gpt-5-codex"]
    );

    thread.run("second", TurnOptions::new()).await.unwrap();
    let args = fake.recorded_args();
    assert_eq!(&args[args.len() - 2..], ["resume", "t1"]);
    assert_eq!(fake.recorded_stdin(), "second");
}

#[tokio::test]
async fn resume_thread_by_id() {
    let fake = FakeCodex::ok(&[r#"{"type":"thread.started","thread_id":"t9"}"#, HI]);
    let mut thread = Codex::new(&fake.options()).resume_thread("t9", ThreadOptions::default());

    thread.run("again", TurnOptions::new()).await.unwrap();
    assert_eq!(
        fake.recorded_args(),
        vec!["exec", "--experimental-json", "resume", "t9"]
    );
    assert_eq!(thread.id(), Some("t9"));
}

#[tokio::test]
async fn structured_input_sends_text_and_images() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, HI]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());
    let input = Input::Items(vec![
        UserInput::Text {
            text: "Describe".to_string(),
        },
        UserInput::LocalImage {
            path: PathBuf::from("/img/a.png"),
        },
        UserInput::Text {
            text: "briefly".to_string(),
        },
    ]);

    thread.run(input, TurnOptions::new()).await.unwrap();
    assert_eq!(fake.recorded_stdin(), "Describe\n\nbriefly");
    assert_eq!(
        fake.recorded_args(),
        vec!["exec", "--experimental-json", "--image", "/img/a.png"]
    );
}

#[tokio::test]
async fn output_schema_is_written_and_removed() {
    let body = format!(
        "prev=\"\"\n\
         for arg in \"$@\"; do\n\
         if [ \"$prev\" = \"--output-schema\" ]; then cp \"$arg\" \"$here/schema_copy.json\"; fi\n\
         prev=\"$arg\"\n\
         done\n\
         cat <<'__EVENTS__'\n{THREAD_STARTED}\n{HI}\n__EVENTS__\n"
    );
    let fake = FakeCodex::with_body(&body);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());
    let schema = json!({
        "type": "object",
        "properties": {"summary": {"type": "string"}},
        "required": ["summary"],
    });

    thread
        .run("hi", TurnOptions::new().with_output_schema(schema.clone()))
        .await
        .unwrap();

    let copied = std::fs::read_to_string(fake.dir().join("schema_copy.json")).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&copied).unwrap(), schema);

    let args = fake.recorded_args();
    let flag = args.iter().position(|a| a == "--output-schema").unwrap();
    assert!(!PathBuf::from(&args[flag + 1]).exists());
}

#[tokio::test]
async fn non_object_schema_is_rejected_before_spawn() {
    let fake = FakeCodex::ok(&[THREAD_STARTED]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let err = thread
        .run("hi", TurnOptions::new().with_output_schema(json!(["not", "an", "object"])))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Schema(_)));
    assert!(fake.recorded_args().is_empty());
}

#[tokio::test]
async fn missing_binary_is_spawn_error() {
    let codex = Codex::new(&codex_sdk::CodexOptions {
        codex_path: Some(PathBuf::from("/nonexistent/bin/codex")),
        ..codex_sdk::CodexOptions::default()
    });
    let mut thread = codex.start_thread(ThreadOptions::default());

    let err = thread.run("hi", TurnOptions::new()).await.unwrap_err();
    assert!(matches!(err, RunError::Spawn(_)));
}

#[tokio::test]
async fn run_streamed_yields_events_in_order() {
    let fake = FakeCodex::ok(&[THREAD_STARTED, TURN_STARTED, HI, TURN_COMPLETED]);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let turn = thread.run_streamed("hi", TurnOptions::new()).await.unwrap();
    let events: Vec<ThreadEvent> = turn
        .into_stream()
        .map(|event| event.unwrap())
        .collect()
        .await;

    let kinds: Vec<&str> = events.iter().map(ThreadEvent::kind).collect();
    assert_eq!(
        kinds,
        vec!["thread.started", "turn.started", "item.completed", "turn.completed"]
    );
    assert!(matches!(
        events[2].item(),
        Some(ThreadItem::AgentMessage(message)) if message.text == "Hi!"
    ));
    assert_eq!(thread.id(), Some("t1"));
}

#[tokio::test]
async fn run_streamed_surfaces_exit_failure_last() {
    let fake = FakeCodex::new(&[THREAD_STARTED], "oops", 4);
    let mut thread = Codex::new(&fake.options()).start_thread(ThreadOptions::default());

    let mut turn = thread.run_streamed("hi", TurnOptions::new()).await.unwrap();
    assert!(turn.next_event().await.unwrap().is_ok());
    assert!(matches!(
        turn.next_event().await,
        Some(Err(RunError::ProcessFailed { code: Some(4), .. }))
    ));
    assert!(turn.next_event().await.is_none());
}
