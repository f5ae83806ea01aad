//! External protocol surface: the sender, tool security levels and
//! sub-agent profiles. Everything here is an interface — concrete LLM
//! transports and tool tables are out of scope for this crate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Usage/cost metadata returned alongside a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// The model name that served the call.
    pub model: String,
    /// Wall-clock time for the call, in milliseconds.
    pub elapsed_ms: u64,
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens produced.
    pub completion_tokens: u64,
    /// Cost of the call in currency units.
    pub cost: Decimal,
}

/// Errors a [`Sender`] implementation can report.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SenderError {
    /// The transport itself failed (network, HTTP, auth).
    #[error("sender transport error: {0}")]
    Transport(String),

    /// The call did not complete before its deadline.
    #[error("sender timed out after {0}ms")]
    Timeout(u64),
}

impl SenderError {
    /// Whether retrying the call might succeed. Both variants are
    /// transient by nature; exhausting the retry budget is the caller's
    /// decision, not this type's.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SenderError::Transport(_) | SenderError::Timeout(_))
    }
}

/// What a [`Sender`] returns for a single prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderResponse {
    /// Raw response text, to be parsed by the prompt parser.
    pub text: String,
    /// Usage/cost metadata for this call.
    pub meta: RunMeta,
}

/// The abstract external LLM transport.
///
/// A function, morally: render a prompt, get text plus usage metadata back.
/// Implementations live outside this crate (HTTP client, mock, replay log).
#[async_trait]
pub trait Sender: Send + Sync {
    /// Send `prompt` with the given `params` (e.g. `temperature`, `seed`)
    /// and return the raw response text plus usage metadata.
    async fn send(
        &self,
        prompt: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<SenderResponse, SenderError>;
}

/// The contract between the core and its external tool/sender consumers,
/// as returned by a completed turn or training example run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the run succeeded end to end (sent, parsed, validated).
    pub ok: bool,
    /// Parsed output fields, empty when `ok` is false.
    pub outputs: BTreeMap<String, Value>,
    /// The raw response text.
    pub raw: String,
    /// The rendered prompt that produced `raw`.
    pub prompt: String,
    /// Usage/cost metadata for the call.
    pub meta: RunMeta,
}

/// Security levels gating tool dispatch. The core only carries the level;
/// enforcement is the external tool table's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No execution permitted at all.
    NoExecution,
    /// Read-only, provably safe operations.
    ReadOnly,
    /// File writes, gated on user confirmation.
    WriteConfirm,
    /// Shell execution, gated on user confirmation.
    ShellConfirm,
    /// Bypass all gating.
    God,
}

impl SecurityLevel {
    /// The level's ordinal, matching the spec's `0..3` numbering (`God` has no ordinal).
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            SecurityLevel::NoExecution => Some(0),
            SecurityLevel::ReadOnly => Some(1),
            SecurityLevel::WriteConfirm => Some(2),
            SecurityLevel::ShellConfirm => Some(3),
            SecurityLevel::God => None,
        }
    }
}

/// A named, allow-listed subset of tool capabilities granted to a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// File read/write/patch/diff-preview/listing.
    Editor,
    /// Read-only research tools plus web search/fetch.
    Researcher,
    /// A finite enumerated set of version-control operations.
    Vcs,
    /// No filtering: every tool is permitted.
    All,
}

impl Profile {
    /// The canonical allow-listed tool names for this profile.
    ///
    /// `All` returns an empty slice by convention: the caller is expected to
    /// treat an empty allow-list from `All` as "no filtering" rather than
    /// "nothing permitted" (see [`Profile::allows`]).
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Profile::Editor => &["read", "write", "patch", "preview-diff", "list-dir"],
            Profile::Researcher => &[
                "read",
                "list-dir",
                "grep",
                "web-search",
                "web-fetch",
                "web-search-news",
            ],
            Profile::Vcs => &[
                "vcs-status",
                "vcs-diff",
                "vcs-log",
                "vcs-commit",
                "vcs-checkout",
            ],
            Profile::All => &[],
        }
    }

    /// Whether this profile permits dispatching `tool_name`.
    pub fn allows(&self, tool_name: &str) -> bool {
        matches!(self, Profile::All) || self.tool_names().contains(&tool_name)
    }
}
