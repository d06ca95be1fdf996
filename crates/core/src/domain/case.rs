use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::journey::{JourneyId, TenantId};
use crate::domain::vendor::{SenderId, VendorId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub task_id: String,
    pub completed: bool,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskCompletion {
    pub fn has_attachment(&self) -> bool {
        self.attachment.as_deref().is_some_and(|reference| !reference.trim().is_empty())
    }
}

/// What this core reads from a case. Storage and mutation belong to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSnapshot {
    pub id: CaseId,
    pub tenant_id: TenantId,
    pub journey_id: JourneyId,
    pub sender_id: SenderId,
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    #[serde(default)]
    pub responsible_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub task_completions: Vec<TaskCompletion>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl CaseSnapshot {
    pub fn open(
        tenant_id: TenantId,
        journey_id: JourneyId,
        sender_id: SenderId,
        state: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CaseId::generate(),
            tenant_id,
            journey_id,
            sender_id,
            vendor_id: None,
            responsible_id: None,
            state: state.into(),
            fields: BTreeMap::new(),
            task_completions: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Present and not blank: null, blank strings and empty collections do not count.
    pub fn has_value(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(entries)) => !entries.is_empty(),
            Some(Value::Bool(_)) | Some(Value::Number(_)) => true,
        }
    }

    /// Latest completion record for a task; later records supersede earlier ones.
    pub fn completion_for(&self, task_id: &str) -> Option<&TaskCompletion> {
        self.task_completions.iter().rev().find(|record| record.task_id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CaseSnapshot, TaskCompletion};
    use crate::domain::journey::{JourneyId, TenantId};
    use crate::domain::vendor::SenderId;

    fn snapshot() -> CaseSnapshot {
        CaseSnapshot::open(
            TenantId("tenant-a".to_string()),
            JourneyId("j-1".to_string()),
            SenderId("+5511999990000".to_string()),
            "new",
        )
    }

    #[test]
    fn blank_values_do_not_count_as_present() {
        let mut case = snapshot();
        case.fields.insert("phone".to_string(), json!("   "));
        case.fields.insert("tags".to_string(), json!([]));
        case.fields.insert("notes".to_string(), json!(null));
        case.fields.insert("mileage".to_string(), json!(0));
        case.fields.insert("insured".to_string(), json!(false));

        assert!(!case.has_value("phone"));
        assert!(!case.has_value("tags"));
        assert!(!case.has_value("notes"));
        assert!(!case.has_value("missing"));
        assert!(case.has_value("mileage"));
        assert!(case.has_value("insured"));
    }

    #[test]
    fn latest_completion_record_wins() {
        let mut case = snapshot();
        case.task_completions.push(TaskCompletion {
            task_id: "photos".to_string(),
            completed: true,
            attachment: None,
            completed_by: None,
            completed_at: None,
        });
        case.task_completions.push(TaskCompletion {
            task_id: "photos".to_string(),
            completed: false,
            attachment: None,
            completed_by: None,
            completed_at: None,
        });

        assert_eq!(case.completion_for("photos").map(|record| record.completed), Some(false));
        assert!(case.completion_for("unknown").is_none());
    }
}
