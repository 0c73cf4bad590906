//! Integration tests for the execution controller
//!
//! Runs real graphs against a file-backed SQLite store and checks what ends
//! up in the checkpoint tables.

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use waypoint_engine::{
    ControllerSettings, EngineError, EventLogger, ExecutionController, ExecutionStatus, InterventionStatus,
    NodeStatus, RunOutcome,
};
use waypoint_graph::{handler_fn, Command, EdgeSpec, GraphBuilder, GraphDefinition, NodeResult, NodeSpec};

#[tokio::test]
async fn test_linear_run_records_nodes_in_order() {
    let h = setup().await;
    linear_graph(&h.registry);

    let id = h.controller.start("linear", json!({"path": []})).await.unwrap();
    let outcome = h.controller.run(&id, false).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { output: json!({"path": ["a", "b"]}) });

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data, Some(json!({"path": ["a", "b"]})));
    assert!(execution.finished_at.is_some());

    let nodes = h.controller.list_node_executions(&id).await.unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(nodes.iter().all(|n| n.status == NodeStatus::Completed));
    assert!(nodes[0].started_at <= nodes[1].started_at);
    assert_eq!(nodes[1].input_data, nodes[0].output_data.clone().unwrap());
}

#[tokio::test]
async fn test_node_failure_fails_run_with_traceback() {
    let h = setup().await;
    failing_graph(&h.registry);

    let id = h.controller.start("failing", json!({})).await.unwrap();
    let outcome = h.controller.run(&id, false).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "Node 'boom' execution failed: kaput".to_string()
        }
    );

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let output = execution.output_data.unwrap();
    assert_eq!(output["error"], "Node 'boom' execution failed: kaput");
    assert!(output["traceback"].as_str().unwrap().contains("1: kaput"));

    let nodes = h.store.list_nodes(&id).await.unwrap();
    assert_eq!(nodes[0].status, NodeStatus::Completed);
    assert_eq!(nodes[1].node_id, "boom");
    assert_eq!(nodes[1].status, NodeStatus::Failed);
    assert_eq!(nodes[1].error.as_deref(), Some("Node 'boom' execution failed: kaput"));
    assert!(nodes[1].finished_at.is_some());
}

#[tokio::test]
async fn test_runs_without_human_nodes_end_in_one_terminal_status() {
    let h = setup().await;
    linear_graph(&h.registry);
    failing_graph(&h.registry);

    let completed = h.controller.start("linear", json!({})).await.unwrap();
    let failed = h.controller.start("failing", json!({})).await.unwrap();
    let errored = h.controller.start("linear", json!({})).await.unwrap();

    h.controller.run(&completed, false).await.unwrap();
    h.controller.run(&failed, false).await.unwrap();
    h.registry.unregister("linear");
    h.controller.run(&errored, false).await.unwrap();

    for (id, expected) in [
        (&completed, ExecutionStatus::Completed),
        (&failed, ExecutionStatus::Failed),
        (&errored, ExecutionStatus::Error),
    ] {
        let execution = h.store.get_execution(id).await.unwrap().unwrap();
        assert_eq!(execution.status, expected);
        assert!(execution.status.is_terminal());
        assert!(execution.finished_at.is_some());
    }
}

#[tokio::test]
async fn test_human_node_pauses_and_resumes_with_response() {
    let h = setup().await;
    review_graph(&h.registry);

    let id = h.controller.start("review", json!({"path": []})).await.unwrap();
    let outcome = h.controller.run(&id, false).await.unwrap();
    let RunOutcome::Paused {
        node_execution_id: Some(node_execution_id),
        request_id: Some(request_id),
    } = outcome
    else {
        panic!("expected a human pause");
    };

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Paused);
    assert!(execution.finished_at.is_none());

    let review = h.store.get_node(&node_execution_id).await.unwrap().unwrap();
    assert_eq!(review.node_id, "review");
    assert_eq!(review.status, NodeStatus::WaitingForHuman);

    let manager = h.controller.interventions();
    let pending = manager.get_pending_interventions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request.id, request_id);
    assert_eq!(pending[0].request.prompt, "Human approval required for node: review");
    assert_eq!(pending[0].request.context_data, json!({"path": ["draft"]}));
    assert_eq!(pending[0].workflow_execution_id, id);
    assert_eq!(pending[0].workflow_id, "review");
    assert_eq!(pending[0].node_id, "review");

    assert!(manager
        .submit_response(&request_id, "alice", json!({"approved": true}), Some("lgtm".into()))
        .await
        .unwrap());
    assert_eq!(
        h.store.get_node(&node_execution_id).await.unwrap().unwrap().status,
        NodeStatus::Resuming
    );

    assert!(manager
        .resume_workflow_execution(&request_id, &h.controller)
        .await
        .unwrap());

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data, Some(json!({"received": {"approved": true}})));

    let history = execution.human_interventions();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].request_id, request_id);
    assert_eq!(history[0].node_execution_id, node_execution_id);
    assert_eq!(history[0].response_data, json!({"approved": true}));
    assert_eq!(history[0].notes.as_deref(), Some("lgtm"));
    assert!(history[0].requested_at <= history[0].responded_at);

    let nodes = h.store.list_nodes(&id).await.unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(ids, vec!["draft", "review", "publish"]);
    assert!(nodes.iter().all(|n| n.status == NodeStatus::Completed));
    assert_eq!(nodes[1].output_data, Some(json!({"approved": true})));
    assert_eq!(nodes[2].input_data, json!({"approved": true}));

    let request = manager.get_intervention_request(&request_id).await.unwrap().unwrap();
    assert_eq!(request.request.status, InterventionStatus::Answered);
    assert!(manager.get_pending_interventions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_human_node_settings_shape_the_request() {
    let h = setup().await;
    review_graph_with(
        &h.registry,
        NodeSpec::new("review")
            .with_config("human_intervention", json!(true))
            .with_config("prompt", json!("Ship it?"))
            .with_config("options", json!(["ship", "hold"]))
            .with_config("priority", json!(5))
            .with_config("expires_in_minutes", json!(30)),
    );

    let id = h.controller.start("review", json!({})).await.unwrap();
    h.controller.run(&id, false).await.unwrap();

    let pending = h.controller.interventions().get_pending_interventions().await.unwrap();
    assert_eq!(pending.len(), 1);
    let request = &pending[0].request;
    assert_eq!(request.prompt, "Ship it?");
    assert_eq!(request.options, Some(json!(["ship", "hold"])));
    assert_eq!(request.priority, 5);
    assert_eq!(
        request.expires_at - request.created_at,
        chrono::Duration::minutes(30)
    );
}

#[tokio::test]
async fn test_resume_without_response_passes_input_through() {
    let h = setup().await;
    review_graph(&h.registry);

    let id = h.controller.start("review", json!({})).await.unwrap();
    let RunOutcome::Paused {
        node_execution_id: Some(node_execution_id),
        request_id: Some(request_id),
    } = h.controller.run(&id, false).await.unwrap()
    else {
        panic!("expected a human pause");
    };

    assert!(h.controller.resume(&id, &node_execution_id, None).await.unwrap());

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data, Some(json!({"received": {"path": ["draft"]}})));
    assert!(execution.human_interventions().is_empty());

    // The unanswered request is closed with the node.
    let request = h.store.get_intervention(&request_id).await.unwrap().unwrap();
    assert_eq!(request.request.status, InterventionStatus::Expired);
}

#[tokio::test]
async fn test_crash_recovery_does_not_rerun_completed_nodes() {
    let h = setup().await;
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let def = GraphDefinition::new("counted")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_edge(EdgeSpec::new("a", "b"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("a", counted("a", Arc::clone(&a_calls)))
            .handler("b", counted("b", Arc::clone(&b_calls)))
            .compile()
            .unwrap(),
    );

    // A previous process completed `a`, started `b` and died.
    let execution = h.store.create_execution("counted", json!({})).await.unwrap();
    assert!(h
        .store
        .transition_execution(&execution.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
        .await
        .unwrap());
    let a = h.store.start_node(&execution.id, "a", json!({})).await.unwrap();
    h.store.complete_node(&a.id, &json!({"path": ["a"]}), None).await.unwrap();
    let stale = h.store.start_node(&execution.id, "b", json!({"path": ["a"]})).await.unwrap();

    let outcome = h.controller.run(&execution.id, true).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { output: json!({"path": ["a", "b"]}) });
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    let nodes = h.store.list_nodes(&execution.id).await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[1].id, stale.id);
    assert_eq!(nodes[1].status, NodeStatus::Failed);
    assert_eq!(nodes[1].error.as_deref(), Some("abandoned by an interrupted run"));
    assert_eq!(nodes[2].node_id, "b");
    assert_eq!(nodes[2].status, NodeStatus::Completed);
    assert_eq!(nodes[2].input_data, json!({"path": ["a"]}));
}

#[tokio::test]
async fn test_double_pause_is_idempotent() {
    let h = setup().await;
    linear_graph(&h.registry);

    let id = h.controller.start("linear", json!({})).await.unwrap();
    assert!(h.controller.pause(&id, None).await.unwrap());
    let first = h.store.get_execution(&id).await.unwrap().unwrap();

    assert!(!h.controller.pause(&id, None).await.unwrap());
    let second = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(second.status, ExecutionStatus::Paused);
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
async fn test_operator_pause_halts_before_next_node() {
    let h = setup().await;
    let gate = Arc::new(Notify::new());
    let def = GraphDefinition::new("gated")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_edge(EdgeSpec::new("a", "b"));
    let waiting = Arc::clone(&gate);
    h.registry.register(
        GraphBuilder::new(def)
            .handler(
                "a",
                handler_fn(move |state: Value| {
                    let gate = Arc::clone(&waiting);
                    async move {
                        gate.notified().await;
                        Ok(NodeResult::State(json!({"from": "a", "in": state})))
                    }
                }),
            )
            .handler("b", append("b"))
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("gated", json!({})).await.unwrap();
    let run = {
        let controller = Arc::clone(&h.controller);
        let id = id.clone();
        tokio::spawn(async move { controller.run(&id, false).await })
    };

    // Wait for `a` to be recorded, then pause while it is still running.
    let a = loop {
        if let Some(node) = h.store.list_nodes(&id).await.unwrap().into_iter().next() {
            break node;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    assert!(h.controller.pause(&id, Some(a.id.as_str())).await.unwrap());
    assert_eq!(h.store.get_node(&a.id).await.unwrap().unwrap().status, NodeStatus::Paused);
    gate.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Paused {
            node_execution_id: None,
            request_id: None
        }
    );
    let nodes = h.store.list_nodes(&id).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].status, NodeStatus::Completed);

    assert!(h.controller.resume(&id, &a.id, None).await.unwrap());
    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(
        execution.output_data,
        Some(json!({"from": "a", "in": {}, "path": ["b"]}))
    );
}

#[tokio::test]
async fn test_node_failure_after_operator_pause_fails_run() {
    let h = setup().await;
    let gate = Arc::new(Notify::new());
    let def = GraphDefinition::new("gated")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_edge(EdgeSpec::new("a", "b"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("a", gated(&gate, |_| Err("kaput".into())))
            .handler("b", append("b"))
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("gated", json!({})).await.unwrap();
    let run = spawn_run(&h, &id, false);
    let a = first_node(&h.store, &id).await;
    assert!(h.controller.pause(&id, None).await.unwrap());
    gate.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "Node 'a' execution failed: kaput".to_string()
        }
    );
    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.output_data.unwrap()["error"], "Node 'a' execution failed: kaput");

    let nodes = h.store.list_nodes(&id).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].status, NodeStatus::Failed);
    assert_eq!(nodes[0].error.as_deref(), Some("Node 'a' execution failed: kaput"));

    // Nothing left to resume.
    assert!(!h.controller.resume(&id, &a.id, None).await.unwrap());
    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn test_last_node_finishing_after_operator_pause_completes_run() {
    let h = setup().await;
    let gate = Arc::new(Notify::new());
    let def = GraphDefinition::new("single").with_node(NodeSpec::new("a"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("a", gated(&gate, |state| Ok(NodeResult::State(json!({"in": state})))))
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("single", json!({"n": 1})).await.unwrap();
    let run = spawn_run(&h, &id, false);
    let a = first_node(&h.store, &id).await;
    assert!(h.controller.pause(&id, Some(a.id.as_str())).await.unwrap());
    gate.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Completed { output: json!({"in": {"n": 1}}) });
    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(h.store.get_node(&a.id).await.unwrap().unwrap().status, NodeStatus::Completed);
}

#[tokio::test]
async fn test_resume_waits_for_paused_traversal_to_halt() {
    let h = setup().await;
    let gate = Arc::new(Notify::new());
    let b_calls = Arc::new(AtomicUsize::new(0));
    let def = GraphDefinition::new("gated")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_edge(EdgeSpec::new("a", "b"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("a", gated(&gate, |_| Ok(NodeResult::State(json!({"from": "a"})))))
            .handler("b", counted("b", Arc::clone(&b_calls)))
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("gated", json!({})).await.unwrap();
    let run = spawn_run(&h, &id, false);
    let a = first_node(&h.store, &id).await;

    // One traversal per run.
    let err = h.controller.run(&id, true).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));

    assert!(h.controller.pause(&id, Some(a.id.as_str())).await.unwrap());
    let resume = {
        let controller = Arc::clone(&h.controller);
        let (id, a_id) = (id.clone(), a.id.clone());
        tokio::spawn(async move { controller.resume(&id, &a_id, None).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!resume.is_finished());
    assert_eq!(h.store.get_node(&a.id).await.unwrap().unwrap().status, NodeStatus::Paused);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);

    gate.notify_one();
    assert_eq!(
        run.await.unwrap().unwrap(),
        RunOutcome::Paused {
            node_execution_id: None,
            request_id: None
        }
    );
    assert!(resume.await.unwrap().unwrap());

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data, Some(json!({"from": "a", "path": ["b"]})));
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    let nodes: Vec<(String, NodeStatus)> = h
        .store
        .list_nodes(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.node_id, n.status))
        .collect();
    assert_eq!(
        nodes,
        vec![
            ("a".to_string(), NodeStatus::Completed),
            ("b".to_string(), NodeStatus::Completed)
        ]
    );
}

#[tokio::test]
async fn test_resume_follows_goto_of_checkpoint() {
    let h = setup().await;
    let gate = Arc::new(Notify::new());
    let def = GraphDefinition::new("detour")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_node(NodeSpec::new("c"))
        .with_edge(EdgeSpec::new("a", "b"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler(
                "a",
                gated(&gate, |_| Ok(Command::goto("c").with_update(json!({"path": ["a"]})).into())),
            )
            .handler("b", append("b"))
            .handler("c", append("c"))
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("detour", json!({})).await.unwrap();
    let run = spawn_run(&h, &id, false);
    let a = first_node(&h.store, &id).await;
    assert!(h.controller.pause(&id, Some(a.id.as_str())).await.unwrap());
    gate.notify_one();
    assert_eq!(run.await.unwrap().unwrap().status(), ExecutionStatus::Paused);

    let checkpoint = h.store.get_node(&a.id).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, NodeStatus::Completed);
    assert_eq!(checkpoint.next_node_id.as_deref(), Some("c"));

    assert!(h.controller.resume(&id, &a.id, None).await.unwrap());
    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data, Some(json!({"path": ["a", "c"]})));
    let visited: Vec<String> = h
        .store
        .list_nodes(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.node_id)
        .collect();
    assert_eq!(visited, vec!["a", "c"]);
}

#[tokio::test]
async fn test_cancel_paused_run() {
    let h = setup().await;
    review_graph(&h.registry);

    let id = h.controller.start("review", json!({})).await.unwrap();
    let RunOutcome::Paused {
        node_execution_id: Some(node_execution_id),
        request_id: Some(request_id),
    } = h.controller.run(&id, false).await.unwrap()
    else {
        panic!("expected a human pause");
    };

    assert!(h.controller.cancel(&id).await.unwrap());
    assert!(!h.controller.cancel(&id).await.unwrap());

    let execution = h.store.get_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.finished_at.is_some());

    let node = h.store.get_node(&node_execution_id).await.unwrap().unwrap();
    assert_eq!(node.status, NodeStatus::Failed);
    assert_eq!(node.error.as_deref(), Some("cancelled"));

    let manager = h.controller.interventions();
    assert!(manager.get_pending_interventions().await.unwrap().is_empty());
    assert!(!manager
        .submit_response(&request_id, "alice", json!({}), None)
        .await
        .unwrap());
    assert!(!h.controller.resume(&id, &node_execution_id, Some(&request_id)).await.unwrap());
}

#[tokio::test]
async fn test_run_refuses_wrong_states_without_side_effects() {
    let h = setup().await;
    linear_graph(&h.registry);

    let created = h.controller.start("linear", json!({})).await.unwrap();
    let err = h.controller.run(&created, true).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    let execution = h.store.get_execution(&created).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Created);
    assert!(h.store.list_nodes(&created).await.unwrap().is_empty());

    h.controller.run(&created, false).await.unwrap();
    assert!(matches!(
        h.controller.run(&created, false).await.unwrap_err(),
        EngineError::InvalidState { .. }
    ));
    assert!(matches!(
        h.controller.run(&created, true).await.unwrap_err(),
        EngineError::InvalidState { .. }
    ));
    assert!(!h.controller.resume(&created, "whatever", None).await.unwrap());

    assert!(matches!(
        h.controller.run("missing", false).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_conditional_routing_follows_node_output() {
    let h = setup().await;
    let def = GraphDefinition::new("route")
        .with_node(NodeSpec::new("check"))
        .with_node(NodeSpec::new("yes"))
        .with_node(NodeSpec::new("no"))
        .with_edge(EdgeSpec::conditional("check", "yes", "approved == true"))
        .with_edge(EdgeSpec::conditional("check", "no", "!approved"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("check", handler_fn(|state: Value| async move { Ok(NodeResult::State(state)) }))
            .handler("yes", append("yes"))
            .handler("no", append("no"))
            .compile()
            .unwrap(),
    );

    for (approved, branch) in [(true, "yes"), (false, "no")] {
        let id = h.controller.start("route", json!({"approved": approved})).await.unwrap();
        let outcome = h.controller.run(&id, false).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                output: json!({"approved": approved, "path": [branch]})
            }
        );
    }
}

#[tokio::test]
async fn test_cycle_hits_step_limit() {
    let h = setup().await;
    let def = GraphDefinition::new("spin")
        .with_node(NodeSpec::new("spin"))
        .with_edge(EdgeSpec::new("spin", "spin"));
    h.registry.register(
        GraphBuilder::new(def)
            .handler("spin", append("spin"))
            .max_steps(3)
            .compile()
            .unwrap(),
    );

    let id = h.controller.start("spin", json!({})).await.unwrap();
    let outcome = h.controller.run(&id, false).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "Step limit of 3 exceeded".to_string()
        }
    );
    let nodes = h.store.list_nodes(&id).await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| n.status == NodeStatus::Completed));
}

#[tokio::test]
async fn test_configured_step_cap_applies_below_graph_limit() {
    let h = setup().await;
    let def = GraphDefinition::new("spin")
        .with_node(NodeSpec::new("spin"))
        .with_edge(EdgeSpec::new("spin", "spin"));
    h.registry.register(GraphBuilder::new(def).handler("spin", append("spin")).compile().unwrap());

    let controller = ExecutionController::with_settings(
        Arc::clone(&h.store),
        Arc::clone(&h.registry) as Arc<dyn waypoint_graph::GraphCatalog>,
        ControllerSettings {
            max_steps: Some(2),
            ..ControllerSettings::default()
        },
        EventLogger::default(),
    );
    let id = controller.start("spin", json!({})).await.unwrap();
    let outcome = controller.run(&id, false).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "Step limit of 2 exceeded".to_string()
        }
    );
    assert_eq!(h.store.list_nodes(&id).await.unwrap().len(), 2);
}
