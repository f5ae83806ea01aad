//! Session context: the state the orchestration loop reads and appends to
//! across turns.

use neuron_qd_archive::ModulePriority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What kind of work the session is doing, mirroring the host's command
/// surface (ask a question, plan architecture, write code, search memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// A direct question-answer exchange.
    Ask,
    /// Architecture/design discussion, no code changes expected.
    Architect,
    /// Code-writing or code-editing work.
    Code,
    /// Semantic search over memory/context, no generation expected.
    Semantic,
}

/// One completed turn, as retained in `Ctx::history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// The module id that served this turn.
    pub module_id: String,
    /// The rendered prompt sent on the final iteration.
    pub prompt: String,
    /// The raw response text on the final iteration.
    pub raw: String,
    /// Whether the turn completed successfully.
    pub ok: bool,
}

/// Session context: carried across turns, mutated only by the orchestration
/// loop appending turns and by evolution producing a new versioned `system`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ctx {
    /// The current system prompt/instructions in force for this session.
    pub system: String,
    /// Free-form session memory, keyed by name.
    pub memory: BTreeMap<String, Value>,
    /// Hints about which tools are relevant to the current task, surfaced
    /// to the renderer as additional context rather than a hard filter.
    pub tool_hints: Vec<String>,
    /// What kind of work this session is doing.
    pub mode: Mode,
    /// The selection priority in force for module selection (§4.D).
    pub priority: ModulePriority,
    /// Ordered history of completed turns.
    pub history: Vec<TurnRecord>,
    /// A compacted summary of history dropped to keep the prompt bounded,
    /// if compaction has ever run for this session.
    pub compacted_summary: Option<String>,
}

impl Ctx {
    /// Start a new session context in `mode`, with no history yet.
    pub fn new(system: impl Into<String>, mode: Mode, priority: ModulePriority) -> Self {
        Self {
            system: system.into(),
            memory: BTreeMap::new(),
            tool_hints: Vec::new(),
            mode,
            priority,
            history: Vec::new(),
            compacted_summary: None,
        }
    }

    /// Append a completed turn to history.
    pub fn record_turn(&mut self, turn: TurnRecord) {
        self.history.push(turn);
    }
}
