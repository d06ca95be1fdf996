use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::journey::TenantId;

/// Channel identity of whoever sent an inbound event (phone number, chat handle).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(pub String);

impl VendorId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Actor linked to a conversation, typically a salesperson.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: VendorId,
    pub tenant_id: TenantId,
    pub sender_id: SenderId,
    pub display_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Vendor {
    pub fn from_sender(tenant_id: TenantId, sender_id: SenderId) -> Self {
        Self {
            id: VendorId::generate(),
            display_name: sender_id.0.clone(),
            tenant_id,
            sender_id,
            active: true,
            created_at: Utc::now(),
        }
    }
}
