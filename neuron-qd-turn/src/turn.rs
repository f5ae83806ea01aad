//! The orchestration loop: one turn, start to finish (§4.K).

use crate::ctx::{Ctx, TurnRecord};
use crate::effect::{Effect, EFFECT_TOOL_NAMES};
use crate::error::TurnError;
use crate::eval::{EvalRecord, EvalSink};
use layer0::hook::{HookAction, HookContext, HookPoint};
use neuron_hooks::HookRegistry;
use neuron_qd_archive::{Archive, PriorityInterpreter};
use neuron_qd_core::{Profile, RunMeta, RunResult, SecurityLevel, Sender};
use neuron_tool::{ToolError, ToolRegistry};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// What one [`run_turn`] call produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The contract result: parsed outputs, ok/raw/prompt, usage metadata.
    pub result: RunResult,
    /// Side-effects the calling layer must apply (memory writes, delegation).
    pub effects: Vec<Effect>,
    /// Names of every tool actually dispatched this turn, in call order.
    pub tools_used: Vec<String>,
    /// Set if a hook halted the turn early, with the hook's stated reason.
    pub halted: Option<String>,
}

/// Drives one turn of the orchestration loop: selects a module, renders and
/// sends a prompt, parses the response, dispatches any requested tools, and
/// records an eval. Holds the dependencies that outlive a single turn
/// (sender, tool table, hook pipeline); per-turn state lives in [`Ctx`].
pub struct TurnRunner {
    sender: Arc<dyn Sender>,
    tools: ToolRegistry,
    interpreter: PriorityInterpreter,
    hooks: HookRegistry,
    max_iterations: u32,
}

impl TurnRunner {
    /// Construct a runner. `hooks` may be an empty [`HookRegistry`]; an
    /// empty pipeline always resolves to `Continue`.
    pub fn new(
        sender: Arc<dyn Sender>,
        tools: ToolRegistry,
        hooks: HookRegistry,
        max_iterations: u32,
    ) -> Self {
        Self {
            sender,
            tools,
            interpreter: PriorityInterpreter::new(),
            hooks,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Run one turn against `archive` (selecting from and, on success,
    /// inserting a fresh online sample back into it) and `ctx` (selecting
    /// the priority and appending the completed turn to history).
    ///
    /// `expected`, if given, is scored exactly against the final parsed
    /// outputs (§4.E). Without it there is no ground truth to judge
    /// against, so the outputs are treated as self-consistent: the turn is
    /// scored purely on latency/cost, not accuracy.
    pub async fn run_turn(
        &self,
        archive: &mut Archive,
        ctx: &mut Ctx,
        task_id: impl Into<String>,
        inputs: BTreeMap<String, Value>,
        expected: Option<BTreeMap<String, Value>>,
        security_level: SecurityLevel,
        eval_sink: &dyn EvalSink,
    ) -> Result<TurnOutcome, TurnError> {
        let task_id = task_id.into();
        let start = Instant::now();

        let module = archive
            .select(&ctx.priority, self.sender.as_ref(), &self.interpreter)
            .await?
            .clone();

        let mut prompt = neuron_qd_prompt::render(&module, &inputs);
        if let Some(summary) = &ctx.compacted_summary {
            prompt = format!("Prior context summary:\n{summary}\n\n{prompt}");
        }

        let mut total_cost = Decimal::ZERO;
        let mut total_tokens = 0u64;
        let mut effects = Vec::new();
        let mut tools_used = Vec::new();

        if let Some(reason) = self.dispatch_halt_check(HookPoint::PreInference).await {
            return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
        }

        let mut response = self.sender.send(&prompt, &module.params).await?;
        total_cost += response.meta.cost;
        total_tokens += response.meta.prompt_tokens + response.meta.completion_tokens;

        if let Some(reason) = self.dispatch_halt_check(HookPoint::PostInference).await {
            return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
        }

        let mut outcome = neuron_qd_prompt::parse(&module, &response.text);
        if !outcome.ok {
            let clarification = format!(
                "{prompt}\n\nYour previous response could not be parsed ({}). \
                 Respond again with STRICT JSON containing exactly the declared output fields.",
                outcome.error.as_ref().expect("ok is false implies error is set"),
            );
            response = self.sender.send(&clarification, &module.params).await?;
            total_cost += response.meta.cost;
            total_tokens += response.meta.prompt_tokens + response.meta.completion_tokens;
            outcome = neuron_qd_prompt::parse(&module, &response.text);
            if !outcome.ok {
                let error = outcome.error.expect("ok is false implies error is set");
                self.record_eval(
                    eval_sink,
                    &task_id,
                    &module,
                    ctx,
                    false,
                    0.1,
                    start.elapsed().as_millis() as u64,
                    total_cost,
                    &tools_used,
                )
                .await;
                return Err(TurnError::ParseFailedAfterRetry(error));
            }
        }

        let mut iterations = 0u32;
        loop {
            let tool_calls = extract_tool_calls(&outcome.outputs);
            if tool_calls.is_empty() {
                break;
            }

            if let Some(reason) = self.dispatch_halt_check(HookPoint::ExitCheck).await {
                return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
            }

            iterations += 1;
            if iterations > self.max_iterations {
                return Err(TurnError::MaxIterationsExceeded(self.max_iterations));
            }

            let mut tool_report = String::new();
            for call in tool_calls {
                if EFFECT_TOOL_NAMES.contains(&call.name.as_str()) {
                    if let Some(effect) = as_effect(&call) {
                        effects.push(effect);
                    }
                    tool_report.push_str(&format!("{}: effect recorded\n", call.name));
                    tools_used.push(call.name);
                    continue;
                }

                if security_level == SecurityLevel::NoExecution {
                    tool_report.push_str(&format!("{}: denied (no-execution security level)\n", call.name));
                    tools_used.push(call.name);
                    continue;
                }

                let mut input = call.input.clone();
                let mut pre_ctx = HookContext::new(HookPoint::PreToolUse);
                pre_ctx.tool_name = Some(call.name.clone());
                pre_ctx.tool_input = Some(input.clone());
                match self.hooks.dispatch(&pre_ctx).await {
                    HookAction::Halt { reason } => {
                        return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
                    }
                    HookAction::SkipTool { reason } => {
                        tool_report.push_str(&format!("{}: skipped ({reason})\n", call.name));
                        tools_used.push(call.name);
                        continue;
                    }
                    HookAction::ModifyToolInput { new_input } => input = new_input,
                    HookAction::Continue => {}
                    _ => {}
                }

                let result_text = match self.tools.get(&call.name) {
                    Some(tool) => match tool.call(input).await {
                        Ok(value) => serde_json::to_string(&value).unwrap_or_default(),
                        Err(ToolError::NotFound(_)) => format!("tool not found: {}", call.name),
                        Err(err) => format!("tool error: {err}"),
                    },
                    None => format!("tool not found: {}", call.name),
                };

                let mut post_ctx = HookContext::new(HookPoint::PostToolUse);
                post_ctx.tool_name = Some(call.name.clone());
                post_ctx.tool_result = Some(result_text.clone());
                let final_text = match self.hooks.dispatch(&post_ctx).await {
                    HookAction::Halt { reason } => {
                        return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
                    }
                    HookAction::ModifyToolOutput { new_output } => {
                        serde_json::to_string(&new_output).unwrap_or(result_text)
                    }
                    _ => result_text,
                };

                tool_report.push_str(&format!("{}: {final_text}\n", call.name));
                tools_used.push(call.name);
            }

            let follow_up = format!(
                "{prompt}\n\nTool results:\n{tool_report}\n\
                 Now respond with STRICT JSON containing exactly the output fields, \
                 incorporating these tool results."
            );

            if let Some(reason) = self.dispatch_halt_check(HookPoint::PreInference).await {
                return Ok(self.halted_outcome(reason, &module, &prompt, effects, tools_used));
            }
            response = self.sender.send(&follow_up, &module.params).await?;
            total_cost += response.meta.cost;
            total_tokens += response.meta.prompt_tokens + response.meta.completion_tokens;
            outcome = neuron_qd_prompt::parse(&module, &response.text);
            if !outcome.ok {
                let error = outcome.error.expect("ok is false implies error is set");
                self.record_eval(
                    eval_sink,
                    &task_id,
                    &module,
                    ctx,
                    false,
                    0.1,
                    start.elapsed().as_millis() as u64,
                    total_cost,
                    &tools_used,
                )
                .await;
                return Err(TurnError::ParseFailedAfterRetry(error));
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let final_meta = RunMeta {
            model: response.meta.model.clone(),
            elapsed_ms,
            prompt_tokens: total_tokens,
            completion_tokens: 0,
            cost: total_cost,
        };

        let expected_for_score = expected.unwrap_or_else(|| outcome.outputs.clone());
        let score = neuron_qd_score::score(&expected_for_score, &outcome.outputs, &final_meta, None);
        let phenotype = neuron_qd_score::phenotype(&final_meta, score);
        archive.insert(module.clone(), score, phenotype);

        ctx.record_turn(TurnRecord {
            module_id: module.id.clone(),
            prompt: prompt.clone(),
            raw: outcome.raw.clone(),
            ok: true,
        });

        self.record_eval(
            eval_sink,
            &task_id,
            &module,
            ctx,
            true,
            score,
            elapsed_ms,
            total_cost,
            &tools_used,
        )
        .await;

        Ok(TurnOutcome {
            result: RunResult {
                ok: true,
                outputs: outcome.outputs,
                raw: outcome.raw,
                prompt,
                meta: final_meta,
            },
            effects,
            tools_used,
            halted: None,
        })
    }

    async fn dispatch_halt_check(&self, point: HookPoint) -> Option<String> {
        let ctx = HookContext::new(point);
        match self.hooks.dispatch(&ctx).await {
            HookAction::Halt { reason } => Some(reason),
            _ => None,
        }
    }

    fn halted_outcome(
        &self,
        reason: String,
        module: &neuron_qd_core::Module,
        prompt: &str,
        effects: Vec<Effect>,
        tools_used: Vec<String>,
    ) -> TurnOutcome {
        tracing::info!(module_id = %module.id, reason, "turn: halted by hook");
        TurnOutcome {
            result: RunResult {
                ok: false,
                outputs: BTreeMap::new(),
                raw: String::new(),
                prompt: prompt.to_string(),
                meta: RunMeta {
                    model: String::new(),
                    elapsed_ms: 0,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    cost: Decimal::ZERO,
                },
            },
            effects,
            tools_used,
            halted: Some(reason),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_eval(
        &self,
        sink: &dyn EvalSink,
        task_id: &str,
        module: &neuron_qd_core::Module,
        ctx: &Ctx,
        ok: bool,
        score: f64,
        elapsed_ms: u64,
        cost: Decimal,
        tools_used: &[String],
    ) {
        let record = EvalRecord {
            ts: chrono::Utc::now(),
            task_id: task_id.to_string(),
            module_id: module.id.clone(),
            profile: None,
            task_type: format!("{:?}", ctx.mode),
            tools_used: tools_used.to_vec(),
            ok,
            score,
            elapsed_ms,
            cost,
        };
        if let Err(err) = sink.record(&record).await {
            tracing::warn!(error = %err, "turn: failed to append eval record");
        }
    }
}

/// A tool call extracted from a module's structured output.
struct ToolCall {
    name: String,
    input: Value,
}

/// Extract `{name, input}` tool calls from a `tool_calls` output field, if
/// the module's signature declared one. Convention, not enforced by
/// `neuron-qd-core`: a `Json`-kind field literally named `tool_calls`
/// holding a JSON array of `{"name": ..., "input": ...}` objects.
fn extract_tool_calls(outputs: &BTreeMap<String, Value>) -> Vec<ToolCall> {
    let Some(Value::Array(items)) = outputs.get("tool_calls") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let input = item.get("input").cloned().unwrap_or(Value::Null);
            Some(ToolCall { name, input })
        })
        .collect()
}

fn as_effect(call: &ToolCall) -> Option<Effect> {
    match call.name.as_str() {
        "write_memory" => {
            let key = call.input.get("key")?.as_str()?.to_string();
            let value = call.input.get("value").cloned().unwrap_or(Value::Null);
            Some(Effect::WriteMemory { key, value })
        }
        "delegate" => {
            let prompt = call.input.get("prompt")?.as_str()?.to_string();
            let profile = match call.input.get("profile").and_then(Value::as_str) {
                Some("editor") => Profile::Editor,
                Some("researcher") => Profile::Researcher,
                Some("vcs") => Profile::Vcs,
                _ => Profile::All,
            };
            Some(Effect::Delegate { prompt, profile })
        }
        _ => None,
    }
}
