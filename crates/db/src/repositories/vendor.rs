use sqlx::Row;

use caseflow_core::domain::journey::TenantId;
use caseflow_core::domain::vendor::{SenderId, Vendor, VendorId};

use super::{decode_error, parse_timestamp, RepositoryError, VendorRepository};
use crate::DbPool;

pub struct SqlVendorRepository {
    pool: DbPool,
}

impl SqlVendorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_vendor(row: &sqlx::sqlite::SqliteRow) -> Result<Vendor, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode_error)?;
    let sender_id: String = row.try_get("sender_id").map_err(decode_error)?;
    let display_name: String = row.try_get("display_name").map_err(decode_error)?;
    let active: bool = row.try_get("active").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(Vendor {
        id: VendorId(id),
        tenant_id: TenantId(tenant_id),
        sender_id: SenderId(sender_id),
        display_name,
        active,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl VendorRepository for SqlVendorRepository {
    async fn find_by_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, sender_id, display_name, active, created_at
             FROM vendor WHERE tenant_id = ? AND sender_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&sender_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_vendor).transpose()
    }

    async fn save(&self, vendor: Vendor) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO vendor (id, tenant_id, sender_id, display_name, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 active = excluded.active",
        )
        .bind(&vendor.id.0)
        .bind(&vendor.tenant_id.0)
        .bind(&vendor.sender_id.0)
        .bind(&vendor.display_name)
        .bind(vendor.active)
        .bind(vendor.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
