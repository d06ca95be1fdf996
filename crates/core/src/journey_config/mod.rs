//! Per-tenant journey configuration document.
//!
//! The document is stored as JSON and edited through partial patches. Internally it is
//! decoded into a typed tree of known branches; unknown top-level branches are carried
//! through untouched in [`JourneyConfig::extra`].

pub mod document;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::journey::StateMachine;
use crate::errors::DomainError;
use crate::keys::{canonicalize, canonicalize_field_key, normalize_field_keys};

pub use document::{merge, merge_into, strip_nulls};

#[derive(Debug, Error)]
pub enum ConfigDocumentError {
    #[error("journey configuration must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("journey configuration could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ConfigDocumentError> for DomainError {
    fn from(value: ConfigDocumentError) -> Self {
        DomainError::InvalidConfigDocument(value.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JourneyConfig {
    pub automation: AutomationConfig,
    pub status_configs: BTreeMap<String, StatusConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
    pub on_text: OnTextRule,
    pub on_image: OnImageRule,
    pub on_location: OnLocationRule,
    pub conversations: ConversationPolicy,
    pub ocr: OcrSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnTextRule {
    pub create_case: bool,
    pub initial_state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnImageRule {
    pub initial_state: String,
    pub create_default_pendencies: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnLocationRule {
    pub create_case: bool,
    pub initial_state: String,
    pub next_state: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationPolicy {
    pub auto_create_vendor: bool,
    pub require_vendor: bool,
}

impl Default for ConversationPolicy {
    fn default() -> Self {
        Self { auto_create_vendor: true, require_vendor: false }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrSettings {
    pub enabled: bool,
    pub provider: String,
}

/// Exit gate for one state: fields that must hold a value and tasks that must be done.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_id: Option<String>,
    pub required_case_fields: Vec<String>,
    pub mandatory_tasks: Vec<MandatoryTask>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MandatoryTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "required_by_default")]
    pub required: bool,
    #[serde(default)]
    pub require_attachment: bool,
}

fn required_by_default() -> bool {
    true
}

impl MandatoryTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required: true,
            require_attachment: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_attachment(mut self) -> Self {
        self.require_attachment = true;
        self
    }
}

impl StatusConfig {
    /// No fields and no tasks: equivalent to having no gate at all.
    pub fn is_empty(&self) -> bool {
        self.required_case_fields.is_empty() && self.mandatory_tasks.is_empty()
    }

    /// Field keys canonical and unique, tasks keyed by a non-empty unique id.
    pub fn normalized(&self) -> Self {
        let responsible_id = self
            .responsible_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let mut mandatory_tasks: Vec<MandatoryTask> = Vec::new();
        for task in &self.mandatory_tasks {
            let mut id = task.id.trim().to_string();
            if id.is_empty() {
                id = canonicalize_field_key(&task.description);
            }
            if id.is_empty() || mandatory_tasks.iter().any(|existing| existing.id == id) {
                continue;
            }
            mandatory_tasks.push(MandatoryTask {
                id,
                description: task.description.trim().to_string(),
                required: task.required,
                require_attachment: task.require_attachment,
            });
        }

        Self {
            responsible_id,
            required_case_fields: normalize_field_keys(&self.required_case_fields),
            mandatory_tasks,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReference {
    pub path: String,
    pub state: String,
}

impl JourneyConfig {
    /// Decodes a stored or merged document. `null` anywhere means "absent".
    pub fn from_document(document: Value) -> Result<Self, ConfigDocumentError> {
        let document = strip_nulls(document);
        if !document.is_object() {
            return Err(ConfigDocumentError::NotAnObject(json_kind(&document)));
        }

        let config: JourneyConfig = serde_json::from_value(document)?;
        Ok(config.normalized())
    }

    pub fn to_document(&self) -> Result<Value, ConfigDocumentError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Merges a partial document onto this configuration and re-normalizes.
    ///
    /// Gate keys in the patch are canonicalized first so they land on the stored entry.
    pub fn apply_patch(&self, patch: &Value) -> Result<Self, ConfigDocumentError> {
        let merged = merge(&self.to_document()?, &canonical_status_keys(patch));
        Self::from_document(merged)
    }

    pub fn status_config(&self, state: &str) -> Option<&StatusConfig> {
        self.status_configs.get(state)
    }

    /// Replaces the gate for one state; an empty gate removes the entry.
    pub fn with_status_config(
        &self,
        state: &str,
        status_config: StatusConfig,
    ) -> Result<Self, DomainError> {
        let key = canonicalize(state);
        if key.is_empty() {
            return Err(DomainError::EmptyStateKey { raw: state.to_string() });
        }

        let mut next = self.clone();
        let status_config = status_config.normalized();
        if status_config.is_empty() {
            next.status_configs.remove(&key);
        } else {
            next.status_configs.insert(key, status_config);
        }
        Ok(next)
    }

    /// Patch form of [`JourneyConfig::with_status_config`], for read-merge-write edits.
    ///
    /// Every gate attribute is spelled out so the patch replaces the stored entry, and an
    /// empty gate becomes `null` so the entry is pruned after the merge.
    pub fn status_config_patch(
        state: &str,
        status_config: &StatusConfig,
    ) -> Result<Value, DomainError> {
        let key = canonicalize(state);
        if key.is_empty() {
            return Err(DomainError::EmptyStateKey { raw: state.to_string() });
        }

        let status_config = status_config.normalized();
        if status_config.is_empty() {
            return Ok(json!({ "statusConfigs": { key: null } }));
        }

        let tasks = serde_json::to_value(&status_config.mandatory_tasks)
            .map_err(|error| DomainError::InvalidConfigDocument(error.to_string()))?;
        Ok(json!({
            "statusConfigs": {
                key: {
                    "responsibleId": status_config.responsible_id,
                    "requiredCaseFields": status_config.required_case_fields,
                    "mandatoryTasks": tasks,
                }
            }
        }))
    }

    /// Every state key this document points at, with the path it was found under.
    pub fn state_references(&self) -> Vec<StateReference> {
        let automation = &self.automation;
        let mut references: Vec<StateReference> = [
            ("automation.onText.initialState", &automation.on_text.initial_state),
            ("automation.onImage.initialState", &automation.on_image.initial_state),
            ("automation.onLocation.initialState", &automation.on_location.initial_state),
            ("automation.onLocation.nextState", &automation.on_location.next_state),
        ]
        .into_iter()
        .filter(|(_, state)| !state.is_empty())
        .map(|(path, state)| StateReference { path: path.to_string(), state: state.clone() })
        .collect();

        references.extend(self.status_configs.keys().map(|state| StateReference {
            path: format!("statusConfigs.{state}"),
            state: state.clone(),
        }));
        references
    }

    pub fn unknown_state_references(&self, machine: &StateMachine) -> Vec<StateReference> {
        self.state_references()
            .into_iter()
            .filter(|reference| !machine.contains(&reference.state))
            .collect()
    }

    fn normalized(mut self) -> Self {
        let automation = &mut self.automation;
        for state in [
            &mut automation.on_text.initial_state,
            &mut automation.on_image.initial_state,
            &mut automation.on_location.initial_state,
            &mut automation.on_location.next_state,
        ] {
            *state = canonicalize(state.as_str());
        }
        automation.ocr.provider = automation.ocr.provider.trim().to_string();

        let mut status_configs = BTreeMap::new();
        for (state, status_config) in std::mem::take(&mut self.status_configs) {
            let key = canonicalize(&state);
            let status_config = status_config.normalized();
            if key.is_empty() || status_config.is_empty() {
                continue;
            }
            status_configs.insert(key, status_config);
        }
        self.status_configs = status_configs;
        self
    }
}

/// Rewrites `statusConfigs` keys of a patch to state keys. Keys that fold together are
/// merged in patch order.
fn canonical_status_keys(patch: &Value) -> Value {
    let Some(entries) = patch.get("statusConfigs").and_then(Value::as_object) else {
        return patch.clone();
    };

    let mut canonical = Map::new();
    for (state, entry) in entries {
        let key = canonicalize(state);
        let key = if key.is_empty() { state.clone() } else { key };
        match canonical.get_mut(&key) {
            Some(existing) => merge_into(existing, entry),
            None => {
                canonical.insert(key, entry.clone());
            }
        }
    }

    let mut patch = patch.clone();
    if let Some(object) = patch.as_object_mut() {
        object.insert("statusConfigs".to_string(), Value::Object(canonical));
    }
    patch
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
