//! ptintel
//!
//! On-demand PassiveTotal enrichment for indicators observed by a host
//! integration platform: batch lookups with summary tags, detail searches,
//! request scheduling and WHOIS history diffs.

pub mod api;
pub mod enrichment;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod models;
pub mod scheduler;
pub mod whois;

pub use enrichment::Enricher;
pub use error::{EntityError, Error, Result};
pub use gateway::{ClientSettings, Credentials, GatewayError, PassiveTotalClient, VendorApi};
pub use models::{
    Entity, EntityType, LookupResult, MessagePayload, MessageResponse, Options, SearchLimitSignal,
    SearchType,
};
