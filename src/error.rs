//! Crate-level error types

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::models::{Entity, SearchType};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A vendor request failed with a non-transient error
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Invalid {option} `{pattern}`: {source}")]
    InvalidRegex {
        option: &'static str,
        pattern: String,
        source: regex::Error,
    },

    /// One or more entities of a batch failed; partial results are discarded
    #[error("{} of the submitted indicators failed to look up", .0.len())]
    Batch(Vec<EntityError>),

    #[error("searchType `{0}` requires an entity")]
    MissingEntity(SearchType),

    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),

    #[error("The datasource for searchType `{0}` is not enabled")]
    DatasourceDisabled(SearchType),

    /// TLS, proxy or timeout settings the HTTP client cannot use
    #[error("Invalid HTTP client configuration: {0}")]
    ClientConfig(String),
}

/// A genuine (non-limiter) failure for one entity of a batch
#[derive(Debug, Error)]
#[error("Lookup of `{entity}` failed: {error}")]
pub struct EntityError {
    pub entity: Entity,
    #[source]
    pub error: GatewayError,
}

impl EntityError {
    pub fn status_code(&self) -> Option<u16> {
        self.error.status_code()
    }
}
