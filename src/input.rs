//! Turn input: plain text or a list of text and image entries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One entry of a structured prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserInput {
    Text { text: String },
    LocalImage { path: PathBuf },
}

/// Prompt for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Items(Vec<UserInput>),
}

impl Input {
    /// Split into the stdin prompt and the `--image` paths.
    ///
    /// Text entries are joined with a blank line.
    #[must_use]
    pub fn normalize(&self) -> (String, Vec<PathBuf>) {
        match self {
            Self::Text(text) => (text.clone(), Vec::new()),
            Self::Items(items) => {
                let mut parts = Vec::new();
                let mut images = Vec::new();
                for item in items {
                    match item {
                        UserInput::Text { text } => parts.push(text.as_str()),
                        UserInput::LocalImage { path } => images.push(path.clone()),
                    }
                }
                (parts.join("\n\n"), images)
            }
        }
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<UserInput>> for Input {
    fn from(items: Vec<UserInput>) -> Self {
        Self::Items(items)
    }
}
