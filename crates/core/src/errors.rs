use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("state label `{raw}` is empty once canonicalized")]
    EmptyStateKey { raw: String },
    #[error("state key `{state}` is not canonical")]
    NonCanonicalStateKey { state: String },
    #[error("journey needs at least {minimum} states, found {found}")]
    TooFewStates { found: usize, minimum: usize },
    #[error("state `{state}` appears more than once")]
    DuplicateState { state: String },
    #[error("default state `{state}` is not one of the journey states")]
    DefaultStateNotInStates { state: String },
    #[error("state `{state}` is not defined for this journey")]
    UnknownState { state: String },
    #[error("journey key `{raw}` is not a valid slug")]
    InvalidTemplateKey { raw: String },
    #[error("`{path}` points at state `{state}`, which this journey does not define")]
    UnknownStateReference { path: String, state: String },
    #[error("case cannot leave `{state}`: missing fields {missing_fields:?}, incomplete tasks {incomplete_tasks:?}")]
    GateBlocked { state: String, missing_fields: Vec<String>, incomplete_tasks: Vec<String> },
    #[error("sender `{sender_id}` has no vendor: requireVendor is on and autoCreateVendor is off")]
    VendorRequired { sender_id: String },
    #[error("invalid journey configuration: {0}")]
    InvalidConfigDocument(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Validation refusals name the offending field, task or key; system failures stay
    /// generic.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } | Self::NotFound { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: refusal_message(&error), correlation_id }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

fn refusal_message(error: &DomainError) -> String {
    match error {
        DomainError::GateBlocked { state, missing_fields, incomplete_tasks } => {
            let mut parts = Vec::new();
            if !missing_fields.is_empty() {
                parts.push(format!("fill in {}", missing_fields.join(", ")));
            }
            if !incomplete_tasks.is_empty() {
                parts.push(format!("complete {}", incomplete_tasks.join(", ")));
            }
            format!("The case cannot leave `{state}` yet: {}.", parts.join("; "))
        }
        other => {
            let mut message = other.to_string();
            if let Some(first) = message.get(..1) {
                let upper = first.to_uppercase();
                message.replace_range(..1, &upper);
            }
            format!("{message}.")
        }
    }
}
