use async_trait::async_trait;
use tracing::debug;

use caseflow_core::domain::journey::TenantId;
use caseflow_core::domain::vendor::{SenderId, Vendor};
use caseflow_core::errors::ApplicationError;
use caseflow_core::flows::automation::VendorResolver;

use crate::repositories::VendorRepository;

/// Vendor lookup for the automation evaluator, backed by the vendor table.
pub struct RepositoryVendorResolver<V> {
    vendors: V,
}

impl<V> RepositoryVendorResolver<V>
where
    V: VendorRepository,
{
    pub fn new(vendors: V) -> Self {
        Self { vendors }
    }
}

#[async_trait]
impl<V> VendorResolver for RepositoryVendorResolver<V>
where
    V: VendorRepository,
{
    async fn resolve(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, ApplicationError> {
        Ok(self.vendors.find_by_sender(tenant_id, sender_id).await?)
    }

    async fn create_from_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Vendor, ApplicationError> {
        let vendor = Vendor::from_sender(tenant_id.clone(), sender_id.clone());
        self.vendors.save(vendor.clone()).await?;
        debug!(
            event_name = "dispatch.vendor_persisted",
            tenant_id = %tenant_id.0,
            vendor_id = %vendor.id.0,
            "vendor stored for sender"
        );
        Ok(vendor)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use caseflow_core::domain::journey::TenantId;
    use caseflow_core::domain::vendor::SenderId;
    use caseflow_core::flows::automation::VendorResolver;

    use super::RepositoryVendorResolver;
    use crate::repositories::{InMemoryVendorRepository, VendorRepository};

    #[tokio::test]
    async fn created_vendor_is_resolved_afterwards() {
        let vendors = Arc::new(InMemoryVendorRepository::default());
        let resolver = RepositoryVendorResolver::new(vendors.clone());
        let tenant = TenantId("tenant-a".to_string());
        let sender = SenderId("+5511922223333".to_string());

        assert!(resolver.resolve(&tenant, &sender).await.expect("resolve").is_none());

        let created = resolver.create_from_sender(&tenant, &sender).await.expect("create");
        let resolved = resolver.resolve(&tenant, &sender).await.expect("resolve");
        assert_eq!(resolved.map(|vendor| vendor.id), Some(created.id.clone()));

        let stored = vendors.find_by_sender(&tenant, &sender).await.expect("find");
        assert_eq!(stored.map(|vendor| vendor.display_name), Some("+5511922223333".to_string()));
    }
}
