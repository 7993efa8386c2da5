// system-tests/tests/pour.rs
// ============================================================================
// Module: Pour Scenarios
// Description: End-to-end playbook pouring and workflow auto-transitions.
// ============================================================================
//! ## Overview
//! Covers pouring a playbook into a workflow: variable resolution, condition
//! filtering, hierarchical task ids, dependency wiring with auto-blocking,
//! and the automatic pending/running/completed/failed transitions.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    missing_docs,
    clippy::missing_docs_in_private_items,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use elemgraph_core::DeleteOptions;
use elemgraph_core::ElementPatch;
use elemgraph_core::EngineError;
use elemgraph_core::FieldsPatch;
use elemgraph_core::Playbook;
use elemgraph_core::PlaybookError;
use elemgraph_core::PlaybookId;
use elemgraph_core::PlaybookLoader;
use elemgraph_core::PlaybookStep;
use elemgraph_core::PourRequest;
use elemgraph_core::TaskPatch;
use elemgraph_core::TaskStatus;
use elemgraph_core::VariableSpec;
use elemgraph_core::WorkflowStatus;
use serde_json::json;
use system_tests::alice;
use system_tests::as_alice;
use system_tests::harness;

struct OneShotLoader {
    playbook: Playbook,
}

impl PlaybookLoader for OneShotLoader {
    fn load(&self, id: &PlaybookId) -> Result<Option<Playbook>, PlaybookError> {
        Ok((id == &self.playbook.id).then(|| self.playbook.clone()))
    }
}

fn release_playbook() -> Playbook {
    let mut variables = BTreeMap::new();
    variables.insert(
        "service".to_string(),
        VariableSpec {
            required: true,
            default: None,
            description: None,
        },
    );
    variables.insert(
        "canary".to_string(),
        VariableSpec {
            required: false,
            default: Some(json!(false)),
            description: None,
        },
    );
    Playbook {
        id: PlaybookId::new("release"),
        title: "release {{service}}".to_string(),
        extends: None,
        variables,
        steps: vec![
            PlaybookStep {
                id: "build".to_string(),
                title: "build {{service}}".to_string(),
                description: Some("compile and package {{service}}".to_string()),
                depends_on: Vec::new(),
                condition: None,
                assignee: Some("{{service}}-oncall".to_string()),
                priority: None,
                complexity: None,
                task_type: Some("build".to_string()),
            },
            PlaybookStep {
                id: "canary".to_string(),
                title: "canary {{service}}".to_string(),
                description: None,
                depends_on: vec!["build".to_string()],
                condition: Some("canary".to_string()),
                assignee: None,
                priority: None,
                complexity: None,
                task_type: None,
            },
            PlaybookStep {
                id: "deploy".to_string(),
                title: "deploy {{service}}".to_string(),
                description: None,
                depends_on: vec!["build".to_string(), "canary".to_string()],
                condition: None,
                assignee: None,
                priority: None,
                complexity: None,
                task_type: None,
            },
        ],
    }
}

fn pour(
    h: &system_tests::TestHarness,
    variables: BTreeMap<String, serde_json::Value>,
) -> elemgraph_core::PourOutcome {
    let loader = OneShotLoader {
        playbook: release_playbook(),
    };
    h.engine
        .pour_playbook(
            &loader,
            &PourRequest {
                playbook_id: PlaybookId::new("release"),
                variables,
                title: None,
                ephemeral: false,
            },
            &as_alice(),
        )
        .unwrap()
}

fn set_status(h: &system_tests::TestHarness, id: &elemgraph_core::ElementId, status: TaskStatus) {
    let patch = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(id, patch, &as_alice()).unwrap();
}

// ============================================================================
// SECTION: Pouring
// ============================================================================

#[test]
fn test_pour_skips_conditional_steps_and_wires_edges() {
    let h = harness();
    let outcome = pour(&h, BTreeMap::from([("service".to_string(), json!("billing"))]));

    assert_eq!(outcome.workflow.title, "release billing");
    assert_eq!(outcome.workflow.status, WorkflowStatus::Pending);
    assert_eq!(outcome.skipped_step_ids, vec!["canary".to_string()]);
    assert_eq!(outcome.tasks.len(), 2);
    assert_eq!(outcome.parent_child_edges.len(), 2);
    // The canary-bound edge is dropped; build -> deploy survives.
    assert_eq!(outcome.blocks_edges.len(), 1);

    let build = &outcome.tasks[0];
    let deploy = &outcome.tasks[1];
    assert_eq!(build.core.id.as_str(), format!("{}.1", outcome.workflow.core.id));
    assert_eq!(deploy.core.id.as_str(), format!("{}.2", outcome.workflow.core.id));
    assert_eq!(build.title, "build billing");
    assert_eq!(build.assignee.as_ref().unwrap().as_str(), "billing-oncall");
    assert_eq!(build.task_type, "build");
    assert!(build.description_ref.is_some());

    // The dependent task auto-blocked the moment the edge was wired.
    assert_eq!(build.status, TaskStatus::Open);
    assert_eq!(deploy.status, TaskStatus::Blocked);

    let description = h
        .engine
        .get_document_version(build.description_ref.as_ref().unwrap(), 1)
        .unwrap();
    assert_eq!(description.content, "compile and package billing");
}

#[test]
fn test_pour_honours_variable_defaults() {
    let h = harness();
    let outcome = pour(
        &h,
        BTreeMap::from([
            ("service".to_string(), json!("billing")),
            ("canary".to_string(), json!(true)),
        ]),
    );
    assert!(outcome.skipped_step_ids.is_empty());
    assert_eq!(outcome.tasks.len(), 3);
    assert_eq!(outcome.blocks_edges.len(), 3);
    assert_eq!(outcome.resolved_variables.get("canary"), Some(&json!(true)));
}

#[test]
fn test_pour_requires_declared_variables() {
    let h = harness();
    let loader = OneShotLoader {
        playbook: release_playbook(),
    };
    let error = h
        .engine
        .pour_playbook(
            &loader,
            &PourRequest {
                playbook_id: PlaybookId::new("release"),
                variables: BTreeMap::new(),
                title: None,
                ephemeral: false,
            },
            &as_alice(),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::MissingRequiredField { .. }));
}

#[test]
fn test_pour_rejects_unknown_playbooks() {
    let h = harness();
    let loader = OneShotLoader {
        playbook: release_playbook(),
    };
    let error = h
        .engine
        .pour_playbook(
            &loader,
            &PourRequest {
                playbook_id: PlaybookId::new("nonexistent"),
                variables: BTreeMap::new(),
                title: None,
                ephemeral: false,
            },
            &as_alice(),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidInput { .. }));
}

// ============================================================================
// SECTION: Workflow Auto-Transitions
// ============================================================================

#[test]
fn test_workflow_runs_then_completes_with_its_tasks() {
    let h = harness();
    let outcome = pour(&h, BTreeMap::from([("service".to_string(), json!("billing"))]));
    let workflow_id = outcome.workflow.core.id.clone();
    let build = outcome.tasks[0].core.id.clone();
    let deploy = outcome.tasks[1].core.id.clone();

    set_status(&h, &build, TaskStatus::InProgress);
    let running = h.engine.get(&workflow_id, &Default::default()).unwrap().unwrap();
    assert_eq!(running.element.as_workflow().unwrap().status, WorkflowStatus::Running);

    set_status(&h, &build, TaskStatus::Closed);
    // Closing the blocker releases the deploy task.
    let released = h.engine.get(&deploy, &Default::default()).unwrap().unwrap();
    assert_eq!(released.element.as_task().unwrap().status, TaskStatus::Open);

    set_status(&h, &deploy, TaskStatus::Closed);
    let completed = h.engine.get(&workflow_id, &Default::default()).unwrap().unwrap();
    assert_eq!(
        completed.element.as_workflow().unwrap().status,
        WorkflowStatus::Completed
    );

    let events = h
        .engine
        .get_events(&workflow_id, &elemgraph_core::EventFilter::default())
        .unwrap();
    for kind in [
        elemgraph_core::EventKind::AutoStarted,
        elemgraph_core::EventKind::AutoCompleted,
    ] {
        let event = events.iter().find(|event| event.event_type == kind).unwrap();
        assert_eq!(event.actor.as_str(), "system:workflow");
    }
}

#[test]
fn test_workflow_fails_when_a_task_is_deleted() {
    let h = harness();
    let outcome = pour(&h, BTreeMap::from([("service".to_string(), json!("billing"))]));
    let workflow_id = outcome.workflow.core.id.clone();

    h.engine
        .delete(&outcome.tasks[0].core.id, &DeleteOptions::new(alice()))
        .unwrap();

    let failed = h.engine.get(&workflow_id, &Default::default()).unwrap().unwrap();
    assert_eq!(failed.element.as_workflow().unwrap().status, WorkflowStatus::Failed);
}
