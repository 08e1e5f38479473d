//! The conversion service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use restack_core::result::ChangeKind;
use restack_core::TaskKind;

use crate::client::ConvertError;

/// One conversion call: a task's description and file selection plus the
/// accumulated context from its completed dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertRequest {
    pub task_kind: TaskKind,
    pub description: String,
    pub source_stack: String,
    pub target_stack: String,
    /// Glob patterns selecting the source excerpt the service should read.
    pub input_patterns: Vec<String>,
    /// Task context merged with the outputs of completed dependencies.
    pub context: serde_json::Value,
}

/// One file the service produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedFile {
    pub path: String,
    pub change: ChangeKind,
    /// New content for creates and updates.
    #[serde(default)]
    pub content: Option<String>,
    /// Prior content, when the service echoes it back for diffing.
    #[serde(default)]
    pub previous: Option<String>,
}

/// Successful response from the conversion service.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertResponse {
    #[serde(default)]
    pub files: Vec<ConvertedFile>,
    /// Self-reported confidence in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Narrow interface to the AI conversion capability.
///
/// Implementations must be safe to call concurrently; the engine dispatches
/// up to its per-job concurrency limit of calls at once.
#[async_trait]
pub trait ConvertService: Send + Sync {
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertResponse, ConvertError>;
}
