//! Application services: repositories composed with the core rules.

pub mod catalog;
pub mod dispatch;
pub mod journey_config;
pub mod vendor_resolver;

pub use catalog::{CatalogService, TemplateDraft};
pub use dispatch::{DispatchOutcome, DispatchStatus, EventDispatcher};
pub use journey_config::JourneyConfigEditor;
pub use vendor_resolver::RepositoryVendorResolver;
