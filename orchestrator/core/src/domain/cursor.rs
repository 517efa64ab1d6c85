// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Cursor Rules
//!
//! The single authoritative implementation of turn-taking and cursor advancement.
//! Both the streaming context feed and status-report handling go through these
//! functions; nothing else decides whose turn it is.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure functions over `WorkflowContext` and the action list

use crate::domain::workflow::{Action, ActionState, ActionStatusReport, WorkflowContext};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("workflow {0} has already finished")]
    Finished(String),

    #[error("action index {index} is out of range for {total} actions")]
    IndexOutOfRange { index: usize, total: usize },

    #[error(
        "reported action {task}/{action} does not match {expected_task}/{expected_action} at index {index}"
    )]
    ActionMismatch {
        index: usize,
        task: String,
        action: String,
        expected_task: String,
        expected_action: String,
    },
}

/// Whether the workflow can never move again.
pub fn is_finished(context: &WorkflowContext, action_count: usize) -> bool {
    match context.current_action_state {
        ActionState::Failed | ActionState::Timeout => true,
        ActionState::Success => context.current_action_index + 1 >= action_count,
        _ => false,
    }
}

/// Whether `worker_id` holds the turn for this workflow.
///
/// After a `Success` the turn moves to the owner of the next action, at any
/// index. Otherwise it stays with the owner of the current action.
pub fn is_applicable_to_send(context: &WorkflowContext, actions: &[Action], worker_id: &str) -> bool {
    let index = context.current_action_index;
    match context.current_action_state {
        ActionState::Failed | ActionState::Timeout => false,
        ActionState::Success => actions
            .get(index + 1)
            .is_some_and(|next| next.owner_worker_id == worker_id),
        ActionState::Pending | ActionState::Running => actions
            .get(index)
            .is_some_and(|current| current.owner_worker_id == worker_id),
    }
}

/// Index of the action a report with `status` must refer to.
///
/// A `Running` report after an action has already been recorded starts the next
/// action; every other report refers to the current one.
pub fn expected_action_index(context: &WorkflowContext, status: ActionState) -> usize {
    if status == ActionState::Running && !context.current_action.is_empty() {
        context.current_action_index + 1
    } else {
        context.current_action_index
    }
}

/// Validate `report` against the cursor and return the advanced cursor.
///
/// The input cursor is never modified; on error the caller keeps the old state.
pub fn advance(
    context: &WorkflowContext,
    actions: &[Action],
    report: &ActionStatusReport,
) -> Result<WorkflowContext, CursorError> {
    if is_finished(context, actions.len()) {
        return Err(CursorError::Finished(context.workflow_id.clone()));
    }

    let index = expected_action_index(context, report.action_status);
    let action = actions.get(index).ok_or(CursorError::IndexOutOfRange {
        index,
        total: actions.len(),
    })?;

    if action.task_name != report.task_name || action.name != report.action_name {
        return Err(CursorError::ActionMismatch {
            index,
            task: report.task_name.clone(),
            action: report.action_name.clone(),
            expected_task: action.task_name.clone(),
            expected_action: action.name.clone(),
        });
    }

    Ok(WorkflowContext {
        workflow_id: context.workflow_id.clone(),
        current_worker: report.worker_id.clone(),
        current_task: report.task_name.clone(),
        current_action: report.action_name.clone(),
        current_action_index: index,
        current_action_state: report.action_status,
        total_number_of_actions: context.total_number_of_actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(owners: &[&str]) -> Vec<Action> {
        owners
            .iter()
            .enumerate()
            .map(|(i, owner)| Action {
                id: format!("a{}", i),
                name: format!("action-{}", i),
                task_name: "provision".to_string(),
                image: "img".to_string(),
                owner_worker_id: owner.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn context(index: usize, state: ActionState, total: usize) -> WorkflowContext {
        WorkflowContext {
            workflow_id: "wf".to_string(),
            current_action: if state == ActionState::Pending && index == 0 {
                String::new()
            } else {
                format!("action-{}", index)
            },
            current_action_index: index,
            current_action_state: state,
            total_number_of_actions: total,
            ..Default::default()
        }
    }

    fn report(action: usize, status: ActionState) -> ActionStatusReport {
        ActionStatusReport {
            workflow_id: "wf".to_string(),
            worker_id: "w1".to_string(),
            task_name: "provision".to_string(),
            action_name: format!("action-{}", action),
            action_status: status,
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_and_timeout_are_never_applicable() {
        let acts = actions(&["w1", "w1"]);
        for state in [ActionState::Failed, ActionState::Timeout] {
            assert!(!is_applicable_to_send(&context(0, state, 2), &acts, "w1"));
        }
    }

    #[test]
    fn test_pending_and_running_go_to_current_owner() {
        let acts = actions(&["w1", "w2"]);
        for state in [ActionState::Pending, ActionState::Running] {
            let ctx = context(0, state, 2);
            assert!(is_applicable_to_send(&ctx, &acts, "w1"));
            assert!(!is_applicable_to_send(&ctx, &acts, "w2"));
        }
    }

    #[test]
    fn test_success_hands_turn_to_next_owner_at_any_index() {
        let acts = actions(&["w1", "w2", "w3"]);
        let ctx = context(0, ActionState::Success, 3);
        assert!(is_applicable_to_send(&ctx, &acts, "w2"));
        assert!(!is_applicable_to_send(&ctx, &acts, "w1"));

        let ctx = context(1, ActionState::Success, 3);
        assert!(is_applicable_to_send(&ctx, &acts, "w3"));
        assert!(!is_applicable_to_send(&ctx, &acts, "w2"));
    }

    #[test]
    fn test_success_on_last_action_is_not_applicable() {
        let acts = actions(&["w1", "w1"]);
        let ctx = context(1, ActionState::Success, 2);
        assert!(!is_applicable_to_send(&ctx, &acts, "w1"));
        assert!(is_finished(&ctx, acts.len()));
    }

    #[test]
    fn test_turn_is_exclusive() {
        let acts = actions(&["w1", "w2", "w1", "w3"]);
        let workers = ["w1", "w2", "w3", "w4"];
        for index in 0..acts.len() {
            for state in [ActionState::Pending, ActionState::Running, ActionState::Success] {
                let ctx = context(index, state, acts.len());
                let holders = workers
                    .iter()
                    .filter(|w| is_applicable_to_send(&ctx, &acts, w))
                    .count();
                assert!(holders <= 1, "index {} state {} had {} holders", index, state, holders);
            }
        }
    }

    #[test]
    fn test_expected_index() {
        let fresh = context(0, ActionState::Pending, 2);
        assert_eq!(expected_action_index(&fresh, ActionState::Running), 0);

        let started = context(0, ActionState::Success, 2);
        assert_eq!(expected_action_index(&started, ActionState::Running), 1);
        assert_eq!(expected_action_index(&started, ActionState::Success), 0);
    }

    #[test]
    fn test_advance_walks_the_whole_workflow() {
        let acts = actions(&["w1", "w1", "w1"]);
        let mut ctx = context(0, ActionState::Pending, 3);
        let mut last_index = 0;
        for i in 0..acts.len() {
            for status in [ActionState::Running, ActionState::Success] {
                let next = advance(&ctx, &acts, &report(i, status)).unwrap();
                assert!(next.current_action_index >= last_index);
                assert!(next.current_action_index - last_index <= 1);
                last_index = next.current_action_index;
                ctx = next;
            }
        }
        assert_eq!(ctx.current_action_index, 2);
        assert_eq!(ctx.current_action_state, ActionState::Success);
        assert!(is_finished(&ctx, acts.len()));
    }

    #[test]
    fn test_advance_rejects_name_mismatch() {
        let acts = actions(&["w1", "w1"]);
        let ctx = context(0, ActionState::Pending, 2);
        let err = advance(&ctx, &acts, &report(1, ActionState::Running)).unwrap_err();
        assert!(matches!(err, CursorError::ActionMismatch { index: 0, .. }));

        let mut wrong_task = report(0, ActionState::Running);
        wrong_task.task_name = "other".to_string();
        assert!(matches!(
            advance(&ctx, &acts, &wrong_task),
            Err(CursorError::ActionMismatch { .. })
        ));
    }

    #[test]
    fn test_advance_rejects_past_last_action() {
        let acts = actions(&["w1", "w1"]);
        let ctx = context(1, ActionState::Running, 2);
        let err = advance(&ctx, &acts, &report(1, ActionState::Running)).unwrap_err();
        assert_eq!(err, CursorError::IndexOutOfRange { index: 2, total: 2 });

        let single = actions(&["w1"]);
        let ctx = context(0, ActionState::Running, 1);
        assert!(matches!(
            advance(&ctx, &single, &report(0, ActionState::Running)),
            Err(CursorError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_advance_rejects_finished_workflow() {
        let acts = actions(&["w1", "w1"]);
        let failed = context(0, ActionState::Failed, 2);
        assert_eq!(
            advance(&failed, &acts, &report(1, ActionState::Running)),
            Err(CursorError::Finished("wf".to_string()))
        );
    }
}
