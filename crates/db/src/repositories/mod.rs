use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use caseflow_core::domain::case::{CaseId, CaseSnapshot};
use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, TenantId, TenantJourney};
use caseflow_core::domain::vendor::{SenderId, Vendor};
use caseflow_core::errors::ApplicationError;

pub mod case;
pub mod journey;
pub mod memory;
pub mod vendor;

pub use case::SqlCaseRepository;
pub use journey::{SqlJourneyTemplateRepository, SqlTenantJourneyRepository};
pub use memory::{
    InMemoryCaseRepository, InMemoryJourneyTemplateRepository, InMemoryTenantJourneyRepository,
    InMemoryVendorRepository,
};
pub use vendor::SqlVendorRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(decode_error)
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait JourneyTemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &JourneyId) -> Result<Option<JourneyTemplate>, RepositoryError>;
    async fn find_by_key(&self, key: &str) -> Result<Option<JourneyTemplate>, RepositoryError>;
    async fn list(&self) -> Result<Vec<JourneyTemplate>, RepositoryError>;
    async fn save(&self, template: JourneyTemplate) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TenantJourneyRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<Option<TenantJourney>, RepositoryError>;

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantJourney>, RepositoryError>;

    async fn save(&self, activation: TenantJourney) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CaseRepository: Send + Sync {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<CaseSnapshot>, RepositoryError>;

    /// Most recently opened active case for the sender within one journey.
    async fn find_active_for_sender(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        sender_id: &SenderId,
    ) -> Result<Option<CaseSnapshot>, RepositoryError>;

    async fn save(&self, case: CaseSnapshot) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn find_by_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, RepositoryError>;

    async fn save(&self, vendor: Vendor) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<R> JourneyTemplateRepository for Arc<R>
where
    R: JourneyTemplateRepository + ?Sized,
{
    async fn find_by_id(&self, id: &JourneyId) -> Result<Option<JourneyTemplate>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<JourneyTemplate>, RepositoryError> {
        (**self).find_by_key(key).await
    }

    async fn list(&self) -> Result<Vec<JourneyTemplate>, RepositoryError> {
        (**self).list().await
    }

    async fn save(&self, template: JourneyTemplate) -> Result<(), RepositoryError> {
        (**self).save(template).await
    }
}

#[async_trait]
impl<R> TenantJourneyRepository for Arc<R>
where
    R: TenantJourneyRepository + ?Sized,
{
    async fn find(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<Option<TenantJourney>, RepositoryError> {
        (**self).find(tenant_id, journey_id).await
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantJourney>, RepositoryError> {
        (**self).list_for_tenant(tenant_id).await
    }

    async fn save(&self, activation: TenantJourney) -> Result<(), RepositoryError> {
        (**self).save(activation).await
    }
}

#[async_trait]
impl<R> CaseRepository for Arc<R>
where
    R: CaseRepository + ?Sized,
{
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<CaseSnapshot>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn find_active_for_sender(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        sender_id: &SenderId,
    ) -> Result<Option<CaseSnapshot>, RepositoryError> {
        (**self).find_active_for_sender(tenant_id, journey_id, sender_id).await
    }

    async fn save(&self, case: CaseSnapshot) -> Result<(), RepositoryError> {
        (**self).save(case).await
    }
}

#[async_trait]
impl<R> VendorRepository for Arc<R>
where
    R: VendorRepository + ?Sized,
{
    async fn find_by_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, RepositoryError> {
        (**self).find_by_sender(tenant_id, sender_id).await
    }

    async fn save(&self, vendor: Vendor) -> Result<(), RepositoryError> {
        (**self).save(vendor).await
    }
}
