// crates/elemgraph-core/tests/pour_unit.rs
// ============================================================================
// Module: Pour Unit Tests
// Description: Tests for conditions, templates, variables, and inheritance.
// ============================================================================
//! ## Overview
//! Validates the pour building blocks in isolation: condition grammar,
//! placeholder substitution, variable resolution, playbook inheritance, and
//! automatic workflow status derivation.

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

use elemgraph_core::ActorId;
use elemgraph_core::ElementCore;
use elemgraph_core::ElementId;
use elemgraph_core::Playbook;
use elemgraph_core::PlaybookError;
use elemgraph_core::PlaybookId;
use elemgraph_core::PlaybookLoader;
use elemgraph_core::PlaybookStep;
use elemgraph_core::Task;
use elemgraph_core::TaskStatus;
use elemgraph_core::Timestamp;
use elemgraph_core::VariableSpec;
use elemgraph_core::Workflow;
use elemgraph_core::WorkflowStatus;
use elemgraph_core::compute_workflow_status;
use elemgraph_core::element::Complexity;
use elemgraph_core::element::Priority;
use elemgraph_core::runtime::evaluate_condition;
use elemgraph_core::runtime::resolve_playbook;
use elemgraph_core::runtime::resolve_variables;
use elemgraph_core::runtime::substitute;
use serde_json::Value;
use serde_json::json;

struct MapLoader {
    playbooks: BTreeMap<String, Playbook>,
}

impl PlaybookLoader for MapLoader {
    fn load(&self, id: &PlaybookId) -> Result<Option<Playbook>, PlaybookError> {
        Ok(self.playbooks.get(id.as_str()).cloned())
    }
}

fn step(id: &str, title: &str) -> PlaybookStep {
    PlaybookStep {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        depends_on: Vec::new(),
        condition: None,
        assignee: None,
        priority: None,
        complexity: None,
        task_type: None,
    }
}

fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(name, value)| ((*name).to_string(), value.clone())).collect()
}

fn task_with_status(ordinal: u64, status: TaskStatus) -> Task {
    Task {
        core: ElementCore::new(
            ElementId::new("el-wf123").child(ordinal),
            ActorId::new("alice"),
            Timestamp::from_unix_millis(1_000),
            std::collections::BTreeSet::new(),
            BTreeMap::new(),
        ),
        title: format!("step {ordinal}"),
        status,
        priority: Priority::DEFAULT,
        complexity: Complexity::DEFAULT,
        task_type: "task".to_string(),
        assignee: None,
        owner: None,
        deadline: None,
        scheduled_for: None,
        closed_at: None,
        close_reason: None,
        description_ref: None,
        design_ref: None,
    }
}

fn workflow_with_status(status: WorkflowStatus) -> Workflow {
    Workflow {
        core: ElementCore::new(
            ElementId::new("el-wf123"),
            ActorId::new("alice"),
            Timestamp::from_unix_millis(1_000),
            std::collections::BTreeSet::new(),
            BTreeMap::new(),
        ),
        title: "release".to_string(),
        status,
        playbook: None,
        variables: BTreeMap::new(),
        ephemeral: false,
    }
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

#[test]
fn test_condition_truthiness() {
    let variables = vars(&[
        ("flag", json!(true)),
        ("empty", json!("")),
        ("count", json!(0)),
        ("name", json!("ada")),
    ]);
    assert!(evaluate_condition("flag", &variables).unwrap());
    assert!(!evaluate_condition("empty", &variables).unwrap());
    assert!(!evaluate_condition("count", &variables).unwrap());
    assert!(evaluate_condition("name", &variables).unwrap());
    assert!(!evaluate_condition("missing", &variables).unwrap());
    assert!(evaluate_condition("!missing", &variables).unwrap());
}

#[test]
fn test_condition_comparisons() {
    let variables = vars(&[("env", json!("prod")), ("replicas", json!(3))]);
    assert!(evaluate_condition("env == \"prod\"", &variables).unwrap());
    assert!(evaluate_condition("env != 'staging'", &variables).unwrap());
    assert!(evaluate_condition("replicas == 3", &variables).unwrap());
    assert!(!evaluate_condition("replicas != 3", &variables).unwrap());
}

#[test]
fn test_condition_rejects_malformed_expressions() {
    let variables = vars(&[]);
    for expression in ["", "a b", "env == ", "== x", "env == what"] {
        assert!(
            evaluate_condition(expression, &variables).is_err(),
            "expected {expression:?} to be rejected"
        );
    }
}

// ============================================================================
// SECTION: Templates
// ============================================================================

#[test]
fn test_substitution_replaces_placeholders() {
    let variables = vars(&[("service", json!("billing")), ("replicas", json!(3))]);
    let rendered = substitute("deploy {{service}} x{{replicas}}", &variables).unwrap();
    assert_eq!(rendered, "deploy billing x3");
}

#[test]
fn test_substitution_rejects_unknown_and_unclosed() {
    let variables = vars(&[]);
    assert!(substitute("hello {{who}}", &variables).is_err());
    assert!(substitute("hello {{who", &variables).is_err());
}

// ============================================================================
// SECTION: Variables
// ============================================================================

#[test]
fn test_variable_defaults_and_required_checks() {
    let mut playbook = Playbook {
        id: PlaybookId::new("release"),
        title: "release {{service}}".to_string(),
        extends: None,
        variables: BTreeMap::new(),
        steps: Vec::new(),
    };
    playbook.variables.insert(
        "service".to_string(),
        VariableSpec {
            required: true,
            default: None,
            description: None,
        },
    );
    playbook.variables.insert(
        "env".to_string(),
        VariableSpec {
            required: false,
            default: Some(json!("staging")),
            description: None,
        },
    );

    let resolved = resolve_variables(&playbook, &vars(&[("service", json!("billing"))])).unwrap();
    assert_eq!(resolved.get("service"), Some(&json!("billing")));
    assert_eq!(resolved.get("env"), Some(&json!("staging")));

    assert!(resolve_variables(&playbook, &vars(&[])).is_err());
}

// ============================================================================
// SECTION: Inheritance
// ============================================================================

#[test]
fn test_inheritance_overrides_steps_by_id() {
    let parent = Playbook {
        id: PlaybookId::new("base"),
        title: "base".to_string(),
        extends: None,
        variables: BTreeMap::new(),
        steps: vec![step("build", "build it"), step("test", "test it")],
    };
    let child = Playbook {
        id: PlaybookId::new("release"),
        title: "release".to_string(),
        extends: Some(PlaybookId::new("base")),
        variables: BTreeMap::new(),
        steps: vec![step("test", "test it harder"), step("ship", "ship it")],
    };
    let loader = MapLoader {
        playbooks: BTreeMap::from([
            ("base".to_string(), parent),
            ("release".to_string(), child),
        ]),
    };

    let resolved = resolve_playbook(&loader, &PlaybookId::new("release")).unwrap();
    let titles: Vec<&str> = resolved.steps.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["build it", "test it harder", "ship it"]);
    assert!(resolved.extends.is_none());
}

#[test]
fn test_inheritance_cycles_are_rejected() {
    let a = Playbook {
        id: PlaybookId::new("a"),
        title: "a".to_string(),
        extends: Some(PlaybookId::new("b")),
        variables: BTreeMap::new(),
        steps: Vec::new(),
    };
    let b = Playbook {
        id: PlaybookId::new("b"),
        title: "b".to_string(),
        extends: Some(PlaybookId::new("a")),
        variables: BTreeMap::new(),
        steps: Vec::new(),
    };
    let loader = MapLoader {
        playbooks: BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)]),
    };

    assert!(resolve_playbook(&loader, &PlaybookId::new("a")).is_err());
}

// ============================================================================
// SECTION: Workflow Status
// ============================================================================

#[test]
fn test_workflow_starts_when_a_task_starts() {
    let workflow = workflow_with_status(WorkflowStatus::Pending);
    let tasks = vec![
        task_with_status(1, TaskStatus::InProgress),
        task_with_status(2, TaskStatus::Open),
    ];
    assert_eq!(
        compute_workflow_status(&workflow, &tasks),
        Some(WorkflowStatus::Running)
    );
}

#[test]
fn test_workflow_completes_when_all_tasks_close() {
    let workflow = workflow_with_status(WorkflowStatus::Running);
    let tasks = vec![
        task_with_status(1, TaskStatus::Closed),
        task_with_status(2, TaskStatus::Closed),
    ];
    assert_eq!(
        compute_workflow_status(&workflow, &tasks),
        Some(WorkflowStatus::Completed)
    );
}

#[test]
fn test_workflow_fails_on_a_tombstoned_task() {
    for status in [WorkflowStatus::Pending, WorkflowStatus::Running] {
        let workflow = workflow_with_status(status);
        let tasks = vec![task_with_status(1, TaskStatus::Tombstone)];
        assert_eq!(
            compute_workflow_status(&workflow, &tasks),
            Some(WorkflowStatus::Failed)
        );
    }
}

#[test]
fn test_terminal_workflows_never_transition() {
    for status in [WorkflowStatus::Completed, WorkflowStatus::Failed] {
        let workflow = workflow_with_status(status);
        let tasks = vec![task_with_status(1, TaskStatus::Tombstone)];
        assert_eq!(compute_workflow_status(&workflow, &tasks), None);
    }
}

#[test]
fn test_empty_workflows_hold_their_status() {
    let workflow = workflow_with_status(WorkflowStatus::Running);
    assert_eq!(compute_workflow_status(&workflow, &[]), None);
}
