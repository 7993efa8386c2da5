// crates/elemgraph-core/src/runtime/pour.rs
// ============================================================================
// Module: Elemgraph Workflow Pouring
// Description: Instantiate workflows and tasks from playbook templates.
// Purpose: Resolve inheritance and variables, filter steps, wire edges.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! Pouring turns a playbook into a workflow element plus one task per
//! surviving step. Inheritance resolves recursively through the loader
//! (parent steps first, child steps override by step id). Variables merge
//! declared defaults with caller values; step conditions are evaluated
//! against the resolved map; titles and assignees substitute `{{name}}`
//! placeholders. Tasks receive hierarchical identifiers under the workflow,
//! `blocks` edges mirror each step's `dependsOn`, and every task is linked
//! to the workflow with a `parent-child` edge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use crate::core::DependencyKind;
use crate::core::DependencyRecord;
use crate::core::Element;
use crate::core::ElementId;
use crate::core::EngineError;
use crate::core::NewDocument;
use crate::core::NewElement;
use crate::core::NewTask;
use crate::core::NewWorkflow;
use crate::core::Playbook;
use crate::core::PlaybookId;
use crate::core::Task;
use crate::core::Workflow;
use crate::core::identifiers::ActorId;
use crate::interfaces::PlaybookLoader;
use crate::interfaces::StorageBackend;
use crate::runtime::engine::ElementEngine;
use crate::runtime::engine::MutateOptions;

// ============================================================================
// SECTION: Request and Outcome
// ============================================================================

/// Request to pour a playbook into a workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PourRequest {
    /// Playbook to instantiate.
    pub playbook_id: PlaybookId,
    /// Caller-provided variable values.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Title override; the playbook title template is used when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Mark the poured workflow ephemeral.
    #[serde(default)]
    pub ephemeral: bool,
}

/// Everything created by a pour.
#[derive(Debug, Clone, PartialEq)]
pub struct PourOutcome {
    /// The created workflow.
    pub workflow: Workflow,
    /// Created tasks, in step order.
    pub tasks: Vec<Task>,
    /// `blocks` edges wired between tasks.
    pub blocks_edges: Vec<DependencyRecord>,
    /// `parent-child` edges from each task to the workflow.
    pub parent_child_edges: Vec<DependencyRecord>,
    /// The resolved variable map stored on the workflow.
    pub resolved_variables: BTreeMap<String, Value>,
    /// Step ids skipped by their conditions.
    pub skipped_step_ids: Vec<String>,
}

// ============================================================================
// SECTION: Inheritance Resolution
// ============================================================================

/// Resolves a playbook and its inheritance chain into one flat template.
///
/// Parent steps come first; child steps override by step id; child variable
/// declarations override the parent's.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] on unknown playbooks or
/// inheritance cycles.
pub fn resolve_playbook(
    loader: &dyn PlaybookLoader,
    id: &PlaybookId,
) -> Result<Playbook, EngineError> {
    let mut visiting = BTreeSet::new();
    resolve_recursive(loader, id, &mut visiting)
}

/// Recursive inheritance resolution with a cycle guard.
fn resolve_recursive(
    loader: &dyn PlaybookLoader,
    id: &PlaybookId,
    visiting: &mut BTreeSet<String>,
) -> Result<Playbook, EngineError> {
    if !visiting.insert(id.as_str().to_string()) {
        return Err(EngineError::InvalidInput {
            message: format!("playbook inheritance cycle through {id}"),
        });
    }
    let playbook = loader.load(id)?.ok_or_else(|| EngineError::InvalidInput {
        message: format!("playbook not found: {id}"),
    })?;
    let Some(parent_id) = playbook.extends.clone() else {
        return Ok(playbook);
    };
    let parent = resolve_recursive(loader, &parent_id, visiting)?;
    let mut steps = parent.steps;
    for step in playbook.steps {
        match steps.iter_mut().find(|existing| existing.id == step.id) {
            Some(existing) => *existing = step,
            None => steps.push(step),
        }
    }
    let mut variables = parent.variables;
    variables.extend(playbook.variables);
    Ok(Playbook {
        id: playbook.id,
        title: playbook.title,
        extends: None,
        variables,
        steps,
    })
}

// ============================================================================
// SECTION: Variable Resolution
// ============================================================================

/// Merges declared defaults with caller values and checks required ones.
///
/// Caller values the playbook never declared are kept verbatim; the
/// workflow stores the resolved map as given.
///
/// # Errors
///
/// Returns [`EngineError::MissingRequiredField`] when a required variable
/// has neither a value nor a default.
pub fn resolve_variables(
    playbook: &Playbook,
    provided: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut resolved = BTreeMap::new();
    for (name, spec) in &playbook.variables {
        if let Some(value) = provided.get(name) {
            resolved.insert(name.clone(), value.clone());
        } else if let Some(default) = &spec.default {
            resolved.insert(name.clone(), default.clone());
        } else if spec.required {
            return Err(EngineError::MissingRequiredField {
                field: name.clone(),
            });
        }
    }
    for (name, value) in provided {
        resolved.entry(name.clone()).or_insert_with(|| value.clone());
    }
    Ok(resolved)
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates a step condition against the resolved variables.
///
/// Grammar: `name`, `!name`, `name == <literal>`, `name != <literal>`,
/// with string, number, and boolean literals. A missing variable is falsy.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] on malformed expressions.
pub fn evaluate_condition(
    expression: &str,
    variables: &BTreeMap<String, Value>,
) -> Result<bool, EngineError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(EngineError::InvalidInput {
            message: "empty condition expression".to_string(),
        });
    }
    if let Some((name, literal)) = expression.split_once("!=") {
        let value = lookup(variables, name.trim())?;
        return Ok(!json_equal(&value, &parse_literal(literal.trim())?));
    }
    if let Some((name, literal)) = expression.split_once("==") {
        let value = lookup(variables, name.trim())?;
        return Ok(json_equal(&value, &parse_literal(literal.trim())?));
    }
    if let Some(name) = expression.strip_prefix('!') {
        return Ok(!truthy(&lookup(variables, name.trim())?));
    }
    Ok(truthy(&lookup(variables, expression)?))
}

/// Resolves a variable name, validating the identifier charset.
fn lookup(variables: &BTreeMap<String, Value>, name: &str) -> Result<Value, EngineError> {
    if name.is_empty()
        || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(EngineError::InvalidInput {
            message: format!("invalid variable reference in condition: {name}"),
        });
    }
    Ok(variables.get(name).cloned().unwrap_or(Value::Null))
}

/// Parses a condition literal: quoted string, boolean, or number.
fn parse_literal(text: &str) -> Result<Value, EngineError> {
    if (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
    {
        return Ok(Value::String(text[1 .. text.len() - 1].to_string()));
    }
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Ok(number) = text.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(number)
    {
        return Ok(Value::Number(number));
    }
    Err(EngineError::InvalidInput {
        message: format!("invalid condition literal: {text}"),
    })
}

/// Value equality that compares numbers numerically, so an integer variable
/// matches a decimal literal of the same value.
fn json_equal(a: &Value, b: &Value) -> bool {
    if let (Value::Number(a), Value::Number(b)) = (a, b)
        && let (Some(a), Some(b)) = (a.as_f64(), b.as_f64())
    {
        return (a - b).abs() < f64::EPSILON;
    }
    a == b
}

/// JSON truthiness: null and empty collections are falsy, zero is falsy.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

// ============================================================================
// SECTION: Template Substitution
// ============================================================================

/// Substitutes `{{name}}` placeholders with variable values.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] on unknown variables or unclosed
/// placeholders.
pub fn substitute(
    template: &str,
    variables: &BTreeMap<String, Value>,
) -> Result<String, EngineError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[.. start]);
        let after = &rest[start + 2 ..];
        let Some(end) = after.find("}}") else {
            return Err(EngineError::InvalidInput {
                message: format!("unclosed placeholder in template: {template}"),
            });
        };
        let name = after[.. end].trim();
        let value = variables.get(name).ok_or_else(|| EngineError::InvalidInput {
            message: format!("template references unknown variable: {name}"),
        })?;
        out.push_str(&render(value));
        rest = &after[end + 2 ..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Renders a variable value into template output.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Pour
// ============================================================================

impl<B: StorageBackend> ElementEngine<B> {
    /// Pours a playbook into a workflow with one task per surviving step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on unknown playbooks, missing required
    /// variables, malformed conditions or templates, or backend failure.
    pub fn pour_playbook(
        &self,
        loader: &dyn PlaybookLoader,
        request: &PourRequest,
        options: &MutateOptions,
    ) -> Result<PourOutcome, EngineError> {
        Self::require_public_actor(&options.actor)?;
        let playbook = resolve_playbook(loader, &request.playbook_id)?;
        let resolved = resolve_variables(&playbook, &request.variables)?;

        let known_steps: BTreeSet<&str> =
            playbook.steps.iter().map(|step| step.id.as_str()).collect();
        let mut surviving = Vec::new();
        let mut skipped_step_ids = Vec::new();
        for step in &playbook.steps {
            if step.depends_on.iter().any(|dep| dep == &step.id) {
                return Err(EngineError::InvalidInput {
                    message: format!("step {} depends on itself", step.id),
                });
            }
            for dep in &step.depends_on {
                if !known_steps.contains(dep.as_str()) {
                    return Err(EngineError::InvalidInput {
                        message: format!("step {} depends on unknown step {dep}", step.id),
                    });
                }
            }
            let keep = match &step.condition {
                Some(condition) => evaluate_condition(condition, &resolved)?,
                None => true,
            };
            if keep {
                surviving.push(step.clone());
            } else {
                skipped_step_ids.push(step.id.clone());
            }
        }

        let title = match &request.title {
            Some(title) => title.clone(),
            None => substitute(&playbook.title, &resolved)?,
        };
        let workflow_input = NewWorkflow {
            title,
            playbook: Some(playbook.id.as_str().to_string()),
            variables: resolved.clone(),
            ephemeral: request.ephemeral,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
        };
        let workflow_element = self.create(NewElement::Workflow(workflow_input), options)?;
        let Element::Workflow(workflow) = workflow_element else {
            return Err(EngineError::InvalidInput {
                message: "workflow factory produced a non-workflow element".to_string(),
            });
        };
        let workflow_id = workflow.core.id.clone();

        let mut tasks = Vec::with_capacity(surviving.len());
        let mut task_ids: BTreeMap<String, ElementId> = BTreeMap::new();
        let mut parent_child_edges = Vec::new();
        for step in &surviving {
            let description_ref = match &step.description {
                Some(description) => {
                    Some(self.pour_description(description, &resolved, options)?)
                }
                None => None,
            };
            let assignee = match &step.assignee {
                Some(template) => {
                    let rendered = substitute(template, &resolved)?;
                    (!rendered.is_empty()).then(|| ActorId::new(rendered))
                }
                None => None,
            };
            let ordinal = self.backend().next_child_number(&workflow_id)?;
            let task_id = workflow_id.child(ordinal);
            let input = NewTask {
                title: substitute(&step.title, &resolved)?,
                priority: step.priority,
                complexity: step.complexity,
                task_type: step.task_type.clone(),
                assignee,
                description_ref,
                ..NewTask::default()
            };
            let element =
                self.create_with_id(task_id.clone(), NewElement::Task(input), options)?;
            let Element::Task(task) = element else {
                return Err(EngineError::InvalidInput {
                    message: "task factory produced a non-task element".to_string(),
                });
            };
            parent_child_edges.push(self.add_dependency(
                &task_id,
                &workflow_id,
                DependencyKind::ParentChild,
                None,
                &options.actor,
            )?);
            task_ids.insert(step.id.clone(), task_id);
            tasks.push(task);
        }

        let mut blocks_edges = Vec::new();
        for step in &surviving {
            let Some(step_task) = task_ids.get(&step.id) else {
                continue;
            };
            for dep in &step.depends_on {
                // Dependencies on condition-skipped steps are dropped.
                let Some(blocker_task) = task_ids.get(dep) else {
                    continue;
                };
                blocks_edges.push(self.add_dependency(
                    blocker_task,
                    step_task,
                    DependencyKind::Blocks,
                    None,
                    &options.actor,
                )?);
            }
        }

        // Reload so returned tasks reflect any auto-block transitions the
        // freshly wired edges produced.
        let ordered_ids: Vec<ElementId> = tasks.iter().map(|task| task.core.id.clone()).collect();
        let mut by_id: BTreeMap<ElementId, Task> = self
            .backend()
            .elements(&ordered_ids)?
            .into_iter()
            .filter_map(|persisted| match persisted.element {
                Element::Task(task) => Some((task.core.id.clone(), task)),
                _ => None,
            })
            .collect();
        let tasks = ordered_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        Ok(PourOutcome {
            workflow,
            tasks,
            blocks_edges,
            parent_child_edges,
            resolved_variables: resolved,
            skipped_step_ids,
        })
    }

    /// Creates the description document for a poured step.
    fn pour_description(
        &self,
        template: &str,
        variables: &BTreeMap<String, Value>,
        options: &MutateOptions,
    ) -> Result<ElementId, EngineError> {
        let input = NewDocument {
            content_type: None,
            content: substitute(template, variables)?,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
        };
        let element = self.create(NewElement::Document(input), options)?;
        Ok(element.id().clone())
    }
}
