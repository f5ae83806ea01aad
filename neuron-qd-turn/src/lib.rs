#![deny(missing_docs)]
//! The orchestration loop: the turn driver that ties the module archive,
//! prompt renderer/parser, and external tool table into a single turn, plus
//! the session context and eval-sink machinery it depends on.

pub mod ctx;
pub mod effect;
pub mod error;
pub mod eval;
mod turn;

pub use ctx::{Ctx, Mode, TurnRecord};
pub use effect::{Effect, EFFECT_TOOL_NAMES};
pub use error::TurnError;
pub use eval::{EvalRecord, EvalSink, EvalSinkError, JsonLinesEvalSink, MemoryEvalSink};
pub use turn::{TurnOutcome, TurnRunner};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use layer0::hook::{Hook, HookAction, HookContext, HookPoint};
    use layer0::error::HookError;
    use neuron_hooks::HookRegistry;
    use neuron_qd_archive::{Archive, ModulePriority};
    use neuron_qd_core::{
        FieldKind, Module, RunMeta, SecurityLevel, SenderError, SenderResponse, SigField,
        Signature,
    };
    use neuron_qd_core::Phenotype;
    use neuron_qd_core::Sender;
    use neuron_tool::{ToolDyn, ToolError, ToolRegistry};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::pin::Pin;
    use std::sync::Arc;

    fn sig() -> Signature {
        Signature::new(
            "summarize",
            vec![SigField::new("text", FieldKind::String)],
            vec![SigField::new("summary", FieldKind::String)],
        )
        .unwrap()
    }

    struct StaticSender {
        text: String,
    }

    #[async_trait]
    impl Sender for StaticSender {
        async fn send(
            &self,
            _prompt: &str,
            _params: &BTreeMap<String, Value>,
        ) -> Result<SenderResponse, SenderError> {
            Ok(SenderResponse {
                text: self.text.clone(),
                meta: RunMeta {
                    model: "test".into(),
                    elapsed_ms: 20,
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    cost: Decimal::ZERO,
                },
            })
        }
    }

    fn archive_with_module(module: Module) -> Archive {
        let mut archive = Archive::new("summarize");
        archive.insert(module, 5.0, Phenotype::new(5.0, 100.0, 0.0, 50.0));
        archive
    }

    #[tokio::test]
    async fn happy_path_parses_and_inserts_online() {
        let module = Module::predict(sig(), "Summarize the text.");
        let mut archive = archive_with_module(module);
        let mut ctx = Ctx::new("be helpful", Mode::Ask, ModulePriority::Best);
        let sender = Arc::new(StaticSender {
            text: r#"{"summary": "a brief summary"}"#.to_string(),
        });
        let runner = TurnRunner::new(sender, ToolRegistry::new(), HookRegistry::new(), 4);
        let sink = MemoryEvalSink::new();

        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), Value::String("long text".into()));

        let outcome = runner
            .run_turn(
                &mut archive,
                &mut ctx,
                "task-1",
                inputs,
                None,
                SecurityLevel::ReadOnly,
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.outputs["summary"], Value::String("a brief summary".into()));
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(sink.records().await.len(), 1);
        assert!(archive.len() >= 2);
    }

    #[tokio::test]
    async fn parse_failure_retries_once_then_surfaces() {
        let module = Module::predict(sig(), "Summarize the text.");
        let mut archive = archive_with_module(module);
        let mut ctx = Ctx::new("be helpful", Mode::Ask, ModulePriority::Best);
        let sender = Arc::new(StaticSender {
            text: "not json at all, sorry".to_string(),
        });
        let runner = TurnRunner::new(sender, ToolRegistry::new(), HookRegistry::new(), 4);
        let sink = MemoryEvalSink::new();

        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), Value::String("long text".into()));

        let err = runner
            .run_turn(
                &mut archive,
                &mut ctx,
                "task-2",
                inputs,
                None,
                SecurityLevel::ReadOnly,
                &sink,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::ParseFailedAfterRetry(_)));
        // both the original and the clarification retry failed, eval recorded once
        assert_eq!(sink.records().await.len(), 1);
    }

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            input: Value,
        ) -> Pin<Box<dyn std::future::Future<Output = Result<Value, ToolError>> + Send + '_>>
        {
            Box::pin(async move { Ok(json!({"echoed": input})) })
        }
    }

    struct ToolThenAnswerSender {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Sender for ToolThenAnswerSender {
        async fn send(
            &self,
            _prompt: &str,
            _params: &BTreeMap<String, Value>,
        ) -> Result<SenderResponse, SenderError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let text = if call == 0 {
                r#"{"summary": "placeholder", "tool_calls": [{"name": "echo", "input": {"msg": "hi"}}]}"#
            } else {
                r#"{"summary": "final answer"}"#
            };
            Ok(SenderResponse {
                text: text.to_string(),
                meta: RunMeta {
                    model: "test".into(),
                    elapsed_ms: 5,
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    cost: Decimal::ZERO,
                },
            })
        }
    }

    #[tokio::test]
    async fn tool_call_round_trips_then_final_answer() {
        let module = Module::predict(sig(), "Summarize the text.");
        let mut archive = archive_with_module(module);
        let mut ctx = Ctx::new("be helpful", Mode::Ask, ModulePriority::Best);
        let sender = Arc::new(ToolThenAnswerSender {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let runner = TurnRunner::new(sender, tools, HookRegistry::new(), 4);
        let sink = MemoryEvalSink::new();

        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), Value::String("long text".into()));

        let outcome = runner
            .run_turn(
                &mut archive,
                &mut ctx,
                "task-3",
                inputs,
                None,
                SecurityLevel::ReadOnly,
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.outputs["summary"], Value::String("final answer".into()));
        assert_eq!(outcome.tools_used, vec!["echo".to_string()]);
    }

    struct HaltingHook;

    #[async_trait]
    impl Hook for HaltingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::PreInference]
        }
        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Ok(HookAction::Halt {
                reason: "budget exceeded".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn hook_halts_before_any_sender_call() {
        let module = Module::predict(sig(), "Summarize the text.");
        let mut archive = archive_with_module(module);
        let mut ctx = Ctx::new("be helpful", Mode::Ask, ModulePriority::Best);
        let sender = Arc::new(StaticSender {
            text: r#"{"summary": "should not be reached"}"#.to_string(),
        });
        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(HaltingHook));
        let runner = TurnRunner::new(sender, ToolRegistry::new(), hooks, 4);
        let sink = MemoryEvalSink::new();

        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), Value::String("long text".into()));

        let outcome = runner
            .run_turn(
                &mut archive,
                &mut ctx,
                "task-4",
                inputs,
                None,
                SecurityLevel::ReadOnly,
                &sink,
            )
            .await
            .unwrap();

        assert_eq!(outcome.halted, Some("budget exceeded".to_string()));
        assert!(!outcome.result.ok);
    }

    #[tokio::test]
    async fn no_execution_security_level_denies_tool_dispatch() {
        let module = Module::predict(sig(), "Summarize the text.");
        let mut archive = archive_with_module(module);
        let mut ctx = Ctx::new("be helpful", Mode::Ask, ModulePriority::Best);
        let sender = Arc::new(ToolThenAnswerSender {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let runner = TurnRunner::new(sender, tools, HookRegistry::new(), 4);
        let sink = MemoryEvalSink::new();

        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), Value::String("long text".into()));

        let outcome = runner
            .run_turn(
                &mut archive,
                &mut ctx,
                "task-5",
                inputs,
                None,
                SecurityLevel::NoExecution,
                &sink,
            )
            .await
            .unwrap();

        // the tool call was still logged as attempted but never dispatched
        assert_eq!(outcome.tools_used, vec!["echo".to_string()]);
        assert!(outcome.result.ok);
    }
}
