use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journey_config::JourneyConfig;
use crate::keys::canonicalize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JourneyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Ordered state keys plus the state new cases start in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    pub states: Vec<String>,
    #[serde(rename = "default")]
    pub default_state: String,
}

impl StateMachine {
    pub fn contains(&self, state: &str) -> bool {
        self.states.iter().any(|candidate| candidate == state)
    }

    pub fn position(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|candidate| candidate == state)
    }

    /// Single authority for the "empty means journey default" rule.
    ///
    /// The requested key is canonicalized first. Empty keys and keys that are not part
    /// of this machine resolve to the default state.
    pub fn resolve_state_or_default(&self, requested: &str) -> &str {
        let key = canonicalize(requested);
        if key.is_empty() {
            return &self.default_state;
        }

        match self.states.iter().find(|candidate| **candidate == key) {
            Some(state) => state,
            None => {
                tracing::warn!(
                    event_name = "journey.state_fallback",
                    requested = %requested,
                    fallback = %self.default_state,
                    "configured state is not part of the journey; using default"
                );
                &self.default_state
            }
        }
    }
}

/// Catalog-level journey definition shared by every tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyTemplate {
    pub id: JourneyId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub sector: Option<String>,
    pub is_crm_style: bool,
    pub default_state_machine: StateMachine,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tenant's activation of a journey. Created lazily, disabled instead of deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantJourney {
    pub tenant_id: TenantId,
    pub journey_id: JourneyId,
    pub enabled: bool,
    pub config: JourneyConfig,
    pub updated_at: DateTime<Utc>,
}

impl TenantJourney {
    pub fn new(tenant_id: TenantId, journey_id: JourneyId) -> Self {
        Self {
            tenant_id,
            journey_id,
            enabled: false,
            config: JourneyConfig::default(),
            updated_at: Utc::now(),
        }
    }
}
