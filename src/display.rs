//! Colored CLI display utilities for turn output.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal while a `codex exec` turn streams.

use std::io::{self, Write};
use std::time::Duration;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::exec::{
    CommandExecutionStatus, McpToolCallStatus, PatchApplyStatus, PatchChangeKind, ThreadEvent,
    ThreadItem, Usage,
};
use crate::thread::BatchStats;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// One-line summary of an item.
#[must_use]
pub fn format_item(item: &ThreadItem, raw_mode: bool) -> String {
    match item {
        ThreadItem::AgentMessage(message) => truncate(&message.text, 200, raw_mode),
        ThreadItem::Reasoning(reasoning) => truncate(&reasoning.text, 120, raw_mode),
        ThreadItem::CommandExecution(cmd) => {
            let status = match cmd.status {
                CommandExecutionStatus::InProgress => "running",
                CommandExecutionStatus::Completed => "ok",
                CommandExecutionStatus::Failed => "failed",
                CommandExecutionStatus::Declined => "declined",
                CommandExecutionStatus::Unknown => "unknown",
            };
            match cmd.exit_code {
                Some(code) => format!("{} ({status}, exit {code})", truncate(&cmd.command, 80, raw_mode)),
                None => format!("{} ({status})", truncate(&cmd.command, 80, raw_mode)),
            }
        }
        ThreadItem::FileChange(change) => {
            let files: Vec<String> = change
                .changes
                .iter()
                .map(|c| {
                    let marker = match c.kind {
                        PatchChangeKind::Add => 'A',
                        PatchChangeKind::Delete => 'D',
                        PatchChangeKind::Update => 'M',
                        PatchChangeKind::Unknown => '?',
                    };
                    format!("{marker} {}", c.path)
                })
                .collect();
            let status = match change.status {
                PatchApplyStatus::InProgress => "applying",
                PatchApplyStatus::Completed => "applied",
                PatchApplyStatus::Failed => "failed",
                PatchApplyStatus::Declined => "declined",
                PatchApplyStatus::Unknown => "unknown",
            };
            format!("{} ({status})", files.join(", "))
        }
        ThreadItem::McpToolCall(call) => {
            let status = match call.status {
                McpToolCallStatus::InProgress => "running",
                McpToolCallStatus::Completed => "ok",
                McpToolCallStatus::Failed => "failed",
                McpToolCallStatus::Unknown => "unknown",
            };
            match &call.error {
                Some(error) => format!(
                    "{}.{} ({status}: {})",
                    call.server,
                    call.tool,
                    truncate(&error.message, 80, raw_mode)
                ),
                None => format!("{}.{} ({status})", call.server, call.tool),
            }
        }
        ThreadItem::WebSearch(search) => truncate(&search.query, 80, raw_mode),
        ThreadItem::TodoList(todos) => {
            let done = todos.items.iter().filter(|t| t.completed).count();
            format!("{done}/{} done", todos.items.len())
        }
        ThreadItem::Error(error) => truncate(&error.message, 200, raw_mode),
    }
}

/// Format token usage.
#[must_use]
pub fn format_usage(usage: &Usage) -> String {
    format!(
        "input={} cached={} output={}",
        usage.input_tokens, usage.cached_input_tokens, usage.output_tokens
    )
}

/// Print a streamed event.
pub fn print_event(event: &ThreadEvent, raw_mode: bool) {
    let ts = timestamp();
    match event {
        ThreadEvent::ThreadStarted(started) => println!(
            "{} {} thread={}",
            ts.dimmed(),
            "[THREAD]".blue().bold(),
            started.thread_id.dimmed()
        ),
        ThreadEvent::TurnStarted => println!("{} {}", ts.dimmed(), "[TURN]".blue().bold()),
        ThreadEvent::TurnCompleted(completed) => println!(
            "{} {} completed {}",
            ts.dimmed(),
            "[TURN]".blue().bold(),
            format_usage(&completed.usage).dimmed()
        ),
        ThreadEvent::TurnFailed(failed) => println!(
            "{} {} {}",
            ts.dimmed(),
            "[FAILED]".red().bold(),
            truncate(&failed.error.message, 200, raw_mode).red()
        ),
        ThreadEvent::Error(error) => println!(
            "{} {} {}",
            ts.dimmed(),
            "[ERROR]".red().bold(),
            truncate(&error.message, 200, raw_mode).red()
        ),
        ThreadEvent::ItemStarted(_) | ThreadEvent::ItemUpdated(_) => {}
        ThreadEvent::ItemCompleted(completed) => {
            let item = &completed.item;
            let label = format!("[{}]", item.kind().to_uppercase());
            let summary = format_item(item, raw_mode);
            match item {
                ThreadItem::AgentMessage(_) => {
                    println!("{} {} {}", ts.dimmed(), label.green().bold(), summary);
                }
                ThreadItem::Reasoning(_) => {
                    println!("{} {} {}", ts.dimmed(), label.dimmed(), summary.dimmed());
                }
                ThreadItem::Error(_) => {
                    println!("{} {} {}", ts.dimmed(), label.red().bold(), summary);
                }
                _ => println!("{} {} {}", ts.dimmed(), label.cyan().bold(), summary),
            }
        }
    }
    let _ = io::stdout().flush();
}

/// Print the final response of a turn.
pub fn print_final_response(text: &str) {
    if text.is_empty() {
        return;
    }
    println!("\n{text}");
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

/// Print a raw JSON event line.
pub fn print_raw_event(event_json: &str) {
    println!("{event_json}");
    let _ = io::stdout().flush();
}

fn format_duration(duration: Option<Duration>) -> String {
    duration.map_or_else(|| "-".to_string(), |d| format!("{:.2}s", d.as_secs_f64()))
}

/// Print a one-line batch summary.
pub fn print_batch_summary(stats: &BatchStats) {
    println!(
        "{} runs={} ok={} failed={} cancelled={} min={} mean={} max={} commands={} command_time={} mcp_calls={} {}",
        "[BENCH]".magenta().bold(),
        stats.runs(),
        stats.succeeded.green(),
        stats.failed.red(),
        stats.cancelled.yellow(),
        format_duration(stats.min_elapsed),
        format_duration(stats.mean_elapsed()),
        format_duration(stats.max_elapsed),
        stats.command_count,
        format_duration(Some(stats.command_time)),
        stats.mcp_call_count,
        format_usage(&stats.usage).dimmed()
    );
    let _ = io::stdout().flush();
}
