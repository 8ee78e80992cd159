//! Suggestion service contract and the degrading client.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::prompt::full_request;

/// Fewest options accepted in each list.
pub const MIN_OPTIONS: usize = 3;

/// Most options accepted in each list.
pub const MAX_OPTIONS: usize = 5;

/// Title and description options for a composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
}

impl VideoMetadata {
    /// Check both lists hold between three and five non-empty entries.
    pub fn validate(&self) -> Result<(), SuggestError> {
        for (field, list) in [("titles", &self.titles), ("descriptions", &self.descriptions)] {
            if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&list.len()) {
                return Err(SuggestError::Invalid(format!(
                    "expected {MIN_OPTIONS} to {MAX_OPTIONS} {field}, got {}",
                    list.len()
                )));
            }
            if list.iter().any(|entry| entry.trim().is_empty()) {
                return Err(SuggestError::Invalid(format!("{field} contain an empty entry")));
            }
        }
        Ok(())
    }
}

/// Why a suggestion request produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("suggestion service timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid suggestion response: {0}")]
    Invalid(String),

    #[error("suggestion service failed: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A backend that turns a prompt into metadata options.
#[async_trait::async_trait]
pub trait SuggestionService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, video_prompt: &str) -> Result<VideoMetadata, SuggestError>;
}

/// Call `service`, validate the answer, and bound the wait by `timeout`.
pub async fn suggest(
    service: &dyn SuggestionService,
    video_prompt: &str,
    timeout: Duration,
) -> Result<VideoMetadata, SuggestError> {
    let metadata = tokio::time::timeout(timeout, service.generate(video_prompt))
        .await
        .map_err(|_| SuggestError::Timeout(timeout))??;
    metadata.validate()?;
    Ok(metadata)
}

/// Like [`suggest`], but any failure degrades to `None` with a warning.
pub async fn suggest_with_fallback(
    service: &dyn SuggestionService,
    video_prompt: &str,
    timeout: Duration,
) -> Option<VideoMetadata> {
    match suggest(service, video_prompt, timeout).await {
        Ok(metadata) => {
            tracing::info!(
                service = service.name(),
                titles = metadata.titles.len(),
                descriptions = metadata.descriptions.len(),
                "Received suggestions"
            );
            Some(metadata)
        }
        Err(e) => {
            tracing::warn!(service = service.name(), error = %e, "Suggestions unavailable");
            None
        }
    }
}

/// Runs a local command that reads the request on stdin and prints
/// `{"titles": [...], "descriptions": [...]}` on stdout.
#[derive(Debug, Clone)]
pub struct CommandService {
    program: String,
    args: Vec<String>,
}

impl CommandService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a shell-like command line on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait::async_trait]
impl SuggestionService for CommandService {
    fn name(&self) -> &str {
        &self.program
    }

    async fn generate(&self, video_prompt: &str) -> Result<VideoMetadata, SuggestError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(full_request(video_prompt).as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SuggestError::Service(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
