use serde::{Deserialize, Serialize};

use crate::domain::case::CaseSnapshot;
use crate::errors::DomainError;
use crate::journey_config::{MandatoryTask, StatusConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBlockReason {
    NotCompleted,
    MissingAttachment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteTask {
    pub task_id: String,
    pub description: String,
    pub reason: TaskBlockReason,
}

impl IncompleteTask {
    /// Description when the operator wrote one, otherwise the task id.
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.task_id
        } else {
            &self.description
        }
    }
}

/// Outcome of asking whether a case may leave its current state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub state: String,
    pub allowed: bool,
    pub missing_fields: Vec<String>,
    pub incomplete_tasks: Vec<IncompleteTask>,
}

impl GateVerdict {
    pub fn open(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            allowed: true,
            missing_fields: Vec::new(),
            incomplete_tasks: Vec::new(),
        }
    }

    /// Converts a refusal into the domain error callers surface as a validation failure.
    pub fn ensure_allowed(&self) -> Result<(), DomainError> {
        if self.allowed {
            return Ok(());
        }

        Err(DomainError::GateBlocked {
            state: self.state.clone(),
            missing_fields: self.missing_fields.clone(),
            incomplete_tasks: self
                .incomplete_tasks
                .iter()
                .map(|task| match task.reason {
                    TaskBlockReason::NotCompleted => task.label().to_string(),
                    TaskBlockReason::MissingAttachment => {
                        format!("{} (attachment required)", task.label())
                    }
                })
                .collect(),
        })
    }
}

/// Decides whether `case` may leave `state_key` under `status_config`.
///
/// No gate means the exit is open. Otherwise every required field must hold a non-blank
/// value and every `required` task must be completed, with an attachment when the task
/// asks for one. Tasks with `required = false` never block. Pure predicate: nothing is
/// mutated.
pub fn can_leave_state(
    state_key: &str,
    status_config: Option<&StatusConfig>,
    case: &CaseSnapshot,
) -> GateVerdict {
    let Some(status_config) = status_config else {
        return GateVerdict::open(state_key);
    };

    let missing_fields: Vec<String> = status_config
        .required_case_fields
        .iter()
        .filter(|field| !case.has_value(field))
        .cloned()
        .collect();

    let incomplete_tasks: Vec<IncompleteTask> = status_config
        .mandatory_tasks
        .iter()
        .filter(|task| task.required)
        .filter_map(|task| task_block_reason(task, case).map(|reason| incomplete(task, reason)))
        .collect();

    let allowed = missing_fields.is_empty() && incomplete_tasks.is_empty();
    if !allowed {
        tracing::debug!(
            event_name = "gate.exit_blocked",
            case_id = %case.id.0,
            state = %state_key,
            missing_fields = missing_fields.len(),
            incomplete_tasks = incomplete_tasks.len(),
            "case exit gate is not satisfied"
        );
    }

    GateVerdict { state: state_key.to_string(), allowed, missing_fields, incomplete_tasks }
}

fn task_block_reason(task: &MandatoryTask, case: &CaseSnapshot) -> Option<TaskBlockReason> {
    match case.completion_for(&task.id) {
        Some(record) if record.completed => {
            (task.require_attachment && !record.has_attachment())
                .then_some(TaskBlockReason::MissingAttachment)
        }
        _ => Some(TaskBlockReason::NotCompleted),
    }
}

fn incomplete(task: &MandatoryTask, reason: TaskBlockReason) -> IncompleteTask {
    IncompleteTask { task_id: task.id.clone(), description: task.description.clone(), reason }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{can_leave_state, TaskBlockReason};
    use crate::domain::case::{CaseSnapshot, TaskCompletion};
    use crate::domain::journey::{JourneyId, TenantId};
    use crate::domain::vendor::SenderId;
    use crate::errors::DomainError;
    use crate::journey_config::{JourneyConfig, MandatoryTask, StatusConfig};

    fn case_in(state: &str) -> CaseSnapshot {
        CaseSnapshot::open(
            TenantId("tenant-a".to_string()),
            JourneyId("claims".to_string()),
            SenderId("+5511988887777".to_string()),
            state,
        )
    }

    fn completion(task_id: &str, attachment: Option<&str>) -> TaskCompletion {
        TaskCompletion {
            task_id: task_id.to_string(),
            completed: true,
            attachment: attachment.map(str::to_string),
            completed_by: Some("agent-1".to_string()),
            completed_at: None,
        }
    }

    fn review_gate() -> StatusConfig {
        StatusConfig {
            responsible_id: None,
            required_case_fields: vec!["phone".to_string()],
            mandatory_tasks: vec![MandatoryTask::new("call_customer", "Call the customer")],
        }
    }

    #[test]
    fn missing_gate_means_open_exit() {
        let verdict = can_leave_state("review", None, &case_in("review"));
        assert!(verdict.allowed);
        assert!(verdict.missing_fields.is_empty());
        assert!(verdict.incomplete_tasks.is_empty());
    }

    #[test]
    fn gate_lists_every_missing_item_until_satisfied() {
        let gate = review_gate();
        let mut case = case_in("review");

        let verdict = can_leave_state("review", Some(&gate), &case);
        assert!(!verdict.allowed);
        assert_eq!(verdict.missing_fields, vec!["phone"]);
        assert_eq!(verdict.incomplete_tasks.len(), 1);
        assert_eq!(verdict.incomplete_tasks[0].task_id, "call_customer");
        assert_eq!(verdict.incomplete_tasks[0].reason, TaskBlockReason::NotCompleted);

        case.fields.insert("phone".to_string(), json!("+55 11 3333-4444"));
        case.task_completions.push(completion("call_customer", None));

        let verdict = can_leave_state("review", Some(&gate), &case);
        assert!(verdict.allowed);
        verdict.ensure_allowed().expect("satisfied gate converts to Ok");
    }

    #[test]
    fn blank_field_values_do_not_satisfy_the_gate() {
        let gate = review_gate();
        let mut case = case_in("review");
        case.fields.insert("phone".to_string(), json!(""));
        case.task_completions.push(completion("call_customer", None));

        let verdict = can_leave_state("review", Some(&gate), &case);
        assert_eq!(verdict.missing_fields, vec!["phone"]);
    }

    #[test]
    fn optional_tasks_never_block() {
        let gate = StatusConfig {
            responsible_id: None,
            required_case_fields: Vec::new(),
            mandatory_tasks: vec![MandatoryTask::new("survey", "Send survey").optional()],
        };

        let verdict = can_leave_state("closing", Some(&gate), &case_in("closing"));
        assert!(verdict.allowed);
    }

    #[test]
    fn attachment_tasks_need_a_reference_on_the_completion_record() {
        let gate = StatusConfig {
            responsible_id: None,
            required_case_fields: Vec::new(),
            mandatory_tasks: vec![
                MandatoryTask::new("damage_photos", "Upload damage photos").with_attachment()
            ],
        };
        let mut case = case_in("inspection");
        case.task_completions.push(completion("damage_photos", Some("  ")));

        let verdict = can_leave_state("inspection", Some(&gate), &case);
        assert!(!verdict.allowed);
        assert_eq!(verdict.incomplete_tasks[0].reason, TaskBlockReason::MissingAttachment);

        case.task_completions.push(completion("damage_photos", Some("s3://bucket/photo-1.jpg")));
        assert!(can_leave_state("inspection", Some(&gate), &case).allowed);
    }

    #[test]
    fn uncompleted_record_does_not_count() {
        let gate = review_gate();
        let mut case = case_in("review");
        case.fields.insert("phone".to_string(), json!("123"));
        case.task_completions.push(TaskCompletion {
            completed: false,
            ..completion("call_customer", None)
        });

        let verdict = can_leave_state("review", Some(&gate), &case);
        assert!(!verdict.allowed);
        assert_eq!(verdict.incomplete_tasks[0].reason, TaskBlockReason::NotCompleted);
    }

    #[test]
    fn pruned_gate_reports_open_exit() {
        let config =
            JourneyConfig::default().with_status_config("review", review_gate()).expect("add");
        let config =
            config.with_status_config("review", StatusConfig::default()).expect("clear");

        let verdict =
            can_leave_state("review", config.status_config("review"), &case_in("review"));
        assert!(verdict.allowed);
    }

    #[test]
    fn refusal_converts_to_actionable_domain_error() {
        let gate = StatusConfig {
            responsible_id: None,
            required_case_fields: vec!["plate".to_string()],
            mandatory_tasks: vec![
                MandatoryTask::new("photos", "Vehicle photos").with_attachment(),
                MandatoryTask::new("sign", ""),
            ],
        };
        let mut case = case_in("intake");
        case.task_completions.push(completion("photos", None));

        let error = can_leave_state("intake", Some(&gate), &case)
            .ensure_allowed()
            .expect_err("gate is not satisfied");

        assert_eq!(
            error,
            DomainError::GateBlocked {
                state: "intake".to_string(),
                missing_fields: vec!["plate".to_string()],
                incomplete_tasks: vec![
                    "Vehicle photos (attachment required)".to_string(),
                    "sign".to_string()
                ],
            }
        );
    }
}
