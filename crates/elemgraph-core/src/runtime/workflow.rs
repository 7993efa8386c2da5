// crates/elemgraph-core/src/runtime/workflow.rs
// ============================================================================
// Module: Elemgraph Workflow Transitions
// Description: Automatic workflow status derivation from member task states.
// Purpose: Compute pending/running/completed/failed transitions.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A workflow's status follows its member tasks: it starts running when any
//! task goes in progress, completes when every task is closed, and fails
//! when a member task is tombstoned while the workflow is still live.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::Task;
use crate::core::TaskStatus;
use crate::core::Workflow;
use crate::core::WorkflowStatus;

// ============================================================================
// SECTION: Status Derivation
// ============================================================================

/// Returns the workflow's next automatic status, or `None` when it stays.
///
/// Transitions:
/// - `pending -> running` when any task is in progress.
/// - `running -> completed` when all tasks are closed.
/// - `pending | running -> failed` when any task is tombstoned.
#[must_use]
pub fn compute_workflow_status(workflow: &Workflow, tasks: &[Task]) -> Option<WorkflowStatus> {
    let any_tombstone = tasks.iter().any(|task| task.status == TaskStatus::Tombstone);
    let any_in_progress = tasks.iter().any(|task| task.status == TaskStatus::InProgress);
    let all_closed =
        !tasks.is_empty() && tasks.iter().all(|task| task.status == TaskStatus::Closed);
    match workflow.status {
        WorkflowStatus::Pending => {
            if any_tombstone {
                Some(WorkflowStatus::Failed)
            } else if any_in_progress {
                Some(WorkflowStatus::Running)
            } else {
                None
            }
        }
        WorkflowStatus::Running => {
            if any_tombstone {
                Some(WorkflowStatus::Failed)
            } else if all_closed {
                Some(WorkflowStatus::Completed)
            } else {
                None
            }
        }
        WorkflowStatus::Completed | WorkflowStatus::Failed => None,
    }
}
