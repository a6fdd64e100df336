//! Fake `codex` binary for end-to-end tests.
//!
//! Each fake is a shell script in its own temp directory. It records its
//! arguments and stdin next to itself, then runs the supplied body.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use codex_sdk::CodexOptions;
use tempfile::TempDir;

pub struct FakeCodex {
    dir: TempDir,
    path: PathBuf,
}

impl FakeCodex {
    /// A fake that prints `events`, writes `stderr`, and exits with `code`.
    pub fn new(events: &[&str], stderr: &str, code: i32) -> Self {
        let body = format!(
            "cat <<'__EVENTS__'\n{}\n__EVENTS__\nprintf '%s' '{}' >&2\nexit {}\n",
            events.join("\n"),
            stderr,
            code
        );
        Self::with_body(&body)
    }

    /// A fake that prints `events` and exits successfully.
    pub fn ok(events: &[&str]) -> Self {
        Self::new(events, "", 0)
    }

    /// A fake running an arbitrary shell body after recording its inputs.
    pub fn with_body(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codex");
        let script = format!(
            "#!/bin/sh\n\
             here=\"$(dirname \"$0\")\"\n\
             printf '%s\\n' \"$@\" > \"$here/args.txt\"\n\
             cat > \"$here/stdin.txt\"\n\
             {body}"
        );

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o755)
            .open(&path)
            .unwrap();
        file.write_all(script.as_bytes()).unwrap();
        file.sync_all().unwrap();
        drop(file);

        Self { dir, path }
    }

    pub fn options(&self) -> CodexOptions {
        CodexOptions {
            codex_path: Some(self.path.clone()),
            terminate_timeout_ms: Some(500),
            ..CodexOptions::default()
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Arguments of the most recent invocation.
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("args.txt"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Stdin of the most recent invocation.
    pub fn recorded_stdin(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("stdin.txt")).unwrap_or_default()
    }
}
