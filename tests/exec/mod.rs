//! Exec module tests.

mod stream_test;

/// Verify the public exec types are exported from the library.
#[test]
fn test_all_exec_types_exported() {
    use codex_sdk::exec::{
        parse_event, CancelPoint, CodexExec, DecodeError, ExecArgs, RunError, SpawnError,
        ThreadEvent, ThreadItem, Usage,
    };

    let _ = ExecArgs::new();
    let _ = CodexExec::new(&codex_sdk::CodexOptions::default());
    let _: fn(&str) -> Result<Option<ThreadEvent>, DecodeError> = parse_event;
    let _: fn() -> RunError = || RunError::Cancelled(CancelPoint::Streaming);
    let _: fn() -> SpawnError = || SpawnError::NotFound("codex".into());
    let _: Option<ThreadItem> = None;
    assert_eq!(Usage::default(), Usage::new(0, 0, 0));
}
