//! End-to-end composition of the quality-diversity module system: a root
//! task decomposed into sub-tasks, each driven through the orchestration
//! loop (`TurnRunner`) by an independent sub-agent worker, with results fed
//! back into the tree and an archive that keeps evolving online.
//!
//! Demonstrates the K -> D/J -> G/H data flow described in the system
//! overview: the decomposition engine bounds how many sub-agents get
//! spawned, the scheduler runs them concurrently, and each one calls back
//! into a shared archive via the turn runner.

use async_trait::async_trait;
use neuron_qd_archive::{Archive, ModulePriority};
use neuron_qd_core::{FieldKind, Module, Profile, RunMeta, SecurityLevel, SenderError, SenderResponse, SigField, Signature};
use neuron_qd_core::Sender;
use neuron_qd_decomp::{DecompPriority, DecompositionState};
use neuron_qd_subagent::Scheduler;
use neuron_qd_turn::{Ctx, MemoryEvalSink, Mode, TurnRunner};
use neuron_hooks::HookRegistry;
use neuron_tool::ToolRegistry;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn triage_signature() -> Signature {
    Signature::new(
        "triage",
        vec![SigField::new("ticket", FieldKind::String)],
        vec![SigField::new("verdict", FieldKind::String)],
    )
    .unwrap()
}

/// Returns a canned verdict for whatever ticket text it's given; the exact
/// wording doesn't matter to this test, only that every sub-agent gets a
/// real turn through the archive/renderer/parser pipeline.
struct CannedSender;

#[async_trait]
impl Sender for CannedSender {
    async fn send(
        &self,
        _prompt: &str,
        _params: &BTreeMap<String, Value>,
    ) -> Result<SenderResponse, SenderError> {
        Ok(SenderResponse {
            text: r#"{"verdict": "needs follow-up"}"#.to_string(),
            meta: RunMeta {
                model: "canned".into(),
                elapsed_ms: 15,
                prompt_tokens: 8,
                completion_tokens: 4,
                cost: Decimal::ZERO,
            },
        })
    }
}

#[tokio::test]
async fn decomposition_spawns_sub_agents_that_drive_the_turn_loop() {
    let mut archive = Archive::new("triage");
    let seed = Module::predict(triage_signature(), "Triage the ticket.");
    archive.insert(
        seed,
        5.0,
        neuron_qd_core::Phenotype::new(5.0, 100.0, 0.05, 40.0),
    );
    let archive = Arc::new(tokio::sync::Mutex::new(archive));

    let mut decomp = DecompositionState::new(
        "handle the incoming ticket backlog",
        "triage",
        DecompPriority::Normal,
        Profile::Researcher,
        Decimal::new(10, 0),
        1000,
    );
    let root = decomp.tree.root();
    let mut children = Vec::new();
    for i in 0..3 {
        let id = decomp
            .try_add_child(root, format!("ticket #{i}"), Profile::Researcher)
            .expect("within breadth limit");
        children.push(id);
    }
    assert_eq!(decomp.tree.breadth(), 3);
    assert!(decomp.detect_explosion().is_none());

    let scheduler = Arc::new(Scheduler::new());
    let mut task_ids = Vec::new();
    for child in &children {
        let task = decomp.tree.node(*child).unwrap().task.clone();
        let archive = Arc::clone(&archive);
        let task_id = scheduler
            .spawn(task.clone(), Profile::Researcher, move |prompt, _profile, _signal| {
                let archive = Arc::clone(&archive);
                async move {
                    let sender: Arc<dyn Sender> = Arc::new(CannedSender);
                    let runner =
                        TurnRunner::new(sender, ToolRegistry::new(), HookRegistry::new(), 4);
                    let mut ctx = Ctx::new("be decisive", Mode::Ask, ModulePriority::Best);
                    let sink = MemoryEvalSink::new();
                    let mut inputs = BTreeMap::new();
                    inputs.insert("ticket".to_string(), Value::String(prompt));

                    let mut archive = archive.lock().await;
                    let outcome = runner
                        .run_turn(
                            &mut archive,
                            &mut ctx,
                            "sub-task",
                            inputs,
                            None,
                            SecurityLevel::ReadOnly,
                            &sink,
                        )
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(json!(outcome.result.outputs))
                }
            })
            .await;
        task_ids.push(task_id);
    }

    for (child, task_id) in children.iter().zip(task_ids.iter()) {
        let result = scheduler.await_result(task_id).await.unwrap();
        decomp.tree.complete(*child, result.clone()).unwrap();
        assert_eq!(result["verdict"], Value::String("needs follow-up".into()));
    }
    decomp.recompute_phenotype();

    assert_eq!(decomp.tree.success_rate(), 1.0);
    assert_eq!(decomp.current_phenotype.success_rate, 1.0);

    // The archive gained an online sample per sub-agent turn, on top of the
    // single seed module inserted up front.
    let archive = archive.lock().await;
    assert!(archive.len() >= 2);
}

#[tokio::test]
async fn breadth_explosion_rolls_back_and_prunes_the_offending_branch() {
    let mut decomp = DecompositionState::new(
        "expand too eagerly",
        "triage",
        DecompPriority::Low,
        Profile::Editor,
        Decimal::new(10, 0),
        1000,
    );
    let root = decomp.tree.root();

    // Low priority caps max_breadth at 6; walk right up to the edge, then
    // trip it with one more sibling.
    for i in 0..decomp.limits.max_breadth {
        decomp
            .try_add_child(root, format!("task-{i}"), Profile::Editor)
            .expect("within breadth limit");
    }
    assert_eq!(decomp.tree.breadth(), decomp.limits.max_breadth as usize);

    let err = decomp
        .try_add_child(root, "task-overflow", Profile::Editor)
        .unwrap_err();
    assert!(matches!(
        err,
        neuron_qd_decomp::DecompError::Explosion(neuron_qd_decomp::ExplosionReason::Breadth)
    ));
    // try_add_child already rolled back the failed addition internally;
    // breadth is back at the limit, not over it.
    assert_eq!(decomp.tree.breadth(), decomp.limits.max_breadth as usize);
    assert!(decomp.detect_explosion().is_none());
}
