use std::collections::HashMap;

use tokio::sync::RwLock;

use caseflow_core::domain::case::{CaseId, CaseSnapshot};
use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, TenantId, TenantJourney};
use caseflow_core::domain::vendor::{SenderId, Vendor};

use super::{
    CaseRepository, JourneyTemplateRepository, RepositoryError, TenantJourneyRepository,
    VendorRepository,
};

#[derive(Default)]
pub struct InMemoryJourneyTemplateRepository {
    templates: RwLock<HashMap<String, JourneyTemplate>>,
}

#[async_trait::async_trait]
impl JourneyTemplateRepository for InMemoryJourneyTemplateRepository {
    async fn find_by_id(&self, id: &JourneyId) -> Result<Option<JourneyTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates.get(&id.0).cloned())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<JourneyTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates.values().find(|template| template.key == key).cloned())
    }

    async fn list(&self) -> Result<Vec<JourneyTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        let mut listed: Vec<JourneyTemplate> = templates.values().cloned().collect();
        listed.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(listed)
    }

    async fn save(&self, template: JourneyTemplate) -> Result<(), RepositoryError> {
        let mut templates = self.templates.write().await;
        templates.insert(template.id.0.clone(), template);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTenantJourneyRepository {
    activations: RwLock<HashMap<(String, String), TenantJourney>>,
}

#[async_trait::async_trait]
impl TenantJourneyRepository for InMemoryTenantJourneyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<Option<TenantJourney>, RepositoryError> {
        let activations = self.activations.read().await;
        Ok(activations.get(&(tenant_id.0.clone(), journey_id.0.clone())).cloned())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantJourney>, RepositoryError> {
        let activations = self.activations.read().await;
        let mut listed: Vec<TenantJourney> = activations
            .values()
            .filter(|activation| activation.tenant_id == *tenant_id)
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.journey_id.cmp(&right.journey_id));
        Ok(listed)
    }

    async fn save(&self, activation: TenantJourney) -> Result<(), RepositoryError> {
        let mut activations = self.activations.write().await;
        activations.insert(
            (activation.tenant_id.0.clone(), activation.journey_id.0.clone()),
            activation,
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCaseRepository {
    cases: RwLock<HashMap<String, CaseSnapshot>>,
}

#[async_trait::async_trait]
impl CaseRepository for InMemoryCaseRepository {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<CaseSnapshot>, RepositoryError> {
        let cases = self.cases.read().await;
        Ok(cases.get(&id.0).cloned())
    }

    async fn find_active_for_sender(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        sender_id: &SenderId,
    ) -> Result<Option<CaseSnapshot>, RepositoryError> {
        let cases = self.cases.read().await;
        Ok(cases
            .values()
            .filter(|case| {
                case.active
                    && case.tenant_id == *tenant_id
                    && case.journey_id == *journey_id
                    && case.sender_id == *sender_id
            })
            .max_by_key(|case| case.created_at)
            .cloned())
    }

    async fn save(&self, case: CaseSnapshot) -> Result<(), RepositoryError> {
        let mut cases = self.cases.write().await;
        cases.insert(case.id.0.clone(), case);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVendorRepository {
    vendors: RwLock<HashMap<(String, String), Vendor>>,
}

#[async_trait::async_trait]
impl VendorRepository for InMemoryVendorRepository {
    async fn find_by_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, RepositoryError> {
        let vendors = self.vendors.read().await;
        Ok(vendors.get(&(tenant_id.0.clone(), sender_id.0.clone())).cloned())
    }

    async fn save(&self, vendor: Vendor) -> Result<(), RepositoryError> {
        let mut vendors = self.vendors.write().await;
        vendors.insert((vendor.tenant_id.0.clone(), vendor.sender_id.0.clone()), vendor);
        Ok(())
    }
}
