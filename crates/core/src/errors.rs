use thiserror::Error;

use crate::{cart::CartError, catalog::CatalogError, config::ConfigError, session::SessionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<SessionError> for ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::FinalizeFailed(error) => Self::Cart(error),
            other => Self::Domain(DomainError::Session(other)),
        }
    }
}

/// What the storefront shows the shopper. Every variant is a transient
/// notice; none of them ends the screen.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "That selection could not be saved. Check your choices and try again.",
            Self::ServiceUnavailable { .. } => {
                "The store is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
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
            ApplicationError::Domain(DomainError::Session(SessionError::CatalogUnavailable {
                product_slug,
            })) => Self::ServiceUnavailable {
                message: format!("customization catalog for `{product_slug}` is unavailable"),
                correlation_id,
            },
            ApplicationError::Domain(_) => {
                Self::BadRequest { message: "domain validation failed".to_owned(), correlation_id }
            }
            ApplicationError::Cart(CartError::Rejected { reason }) => {
                Self::BadRequest { message: reason, correlation_id }
            }
            ApplicationError::Cart(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
