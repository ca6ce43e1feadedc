//! Core data models for PassiveTotal enrichment

pub mod options;
pub mod vendor;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use options::{Datasource, OptionError, Options, validate_options};
pub use vendor::{Article, CardSummary, PdnsRecord, WhoisRecord};

/// Types of indicators the host hands us
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "IPv4", alias = "ipv4")]
    Ipv4,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "custom")]
    Custom,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Domain => write!(f, "domain"),
            EntityType::Ipv4 => write!(f, "IPv4"),
            EntityType::Email => write!(f, "email"),
            EntityType::Custom => write!(f, "custom"),
        }
    }
}

/// An observed indicator submitted for enrichment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub value: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(rename = "isPrivateIP", default)]
    pub is_private_ip: bool,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            entity_type,
            is_private_ip: false,
        }
    }

    pub fn domain(value: impl Into<String>) -> Self {
        Self::new(EntityType::Domain, value)
    }

    pub fn ipv4(value: impl Into<String>) -> Self {
        Self::new(EntityType::Ipv4, value)
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new(EntityType::Email, value)
    }

    pub fn custom(value: impl Into<String>) -> Self {
        Self::new(EntityType::Custom, value)
    }

    pub fn is_domain(&self) -> bool {
        self.entity_type == EntityType::Domain
    }

    pub fn is_ip(&self) -> bool {
        self.entity_type == EntityType::Ipv4
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Why a request did not produce usable data.
///
/// The flags are independent of each other; a signal is only ever built when at
/// least one of them is set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchLimitSignal {
    pub max_request_queue_limit_hit: bool,
    pub is_connection_reset: bool,
    pub is_gateway_timeout: bool,
    pub api_key_limit_reached: bool,
}

impl SearchLimitSignal {
    pub fn queue_limit() -> Self {
        Self {
            max_request_queue_limit_hit: true,
            ..Self::default()
        }
    }

    pub fn connection_reset() -> Self {
        Self {
            is_connection_reset: true,
            ..Self::default()
        }
    }

    pub fn gateway_timeout() -> Self {
        Self {
            is_gateway_timeout: true,
            ..Self::default()
        }
    }

    pub fn api_key_limit() -> Self {
        Self {
            api_key_limit_reached: true,
            ..Self::default()
        }
    }
}

/// Per-entity outcome of a batch lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub entity: Entity,
    /// `None` means no intelligence was found
    pub data: Option<LookupData>,
    /// Set when the result reflects a transient limiter condition and must not be cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_volatile: Option<bool>,
}

impl LookupResult {
    pub fn miss(entity: Entity) -> Self {
        Self {
            entity,
            data: None,
            is_volatile: None,
        }
    }

    pub fn hit(entity: Entity, data: LookupData) -> Self {
        Self {
            entity,
            data: Some(data),
            is_volatile: None,
        }
    }

    pub fn search_limit(entity: Entity, signal: SearchLimitSignal) -> Self {
        Self {
            entity,
            data: Some(LookupData {
                summary: vec!["Search limit reached".to_string()],
                details: LookupDetails {
                    summary: Some(DetailsSummary::SearchLimit(signal)),
                    ..LookupDetails::default()
                },
            }),
            is_volatile: Some(true),
        }
    }

    pub fn is_volatile(&self) -> bool {
        self.is_volatile.unwrap_or(false)
    }

    /// The limiter signal carried by a volatile result
    pub fn search_limit_signal(&self) -> Option<&SearchLimitSignal> {
        match self.data.as_ref()?.details.summary.as_ref()? {
            DetailsSummary::SearchLimit(signal) => Some(signal),
            DetailsSummary::Card(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupData {
    /// Summary tags shown by the host next to the indicator
    pub summary: Vec<String>,
    pub details: LookupDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LookupDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<DetailsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trackers: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_articles: Option<Vec<Article>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DetailsSummary {
    SearchLimit(SearchLimitSignal),
    Card(CardSummary),
}

/// Detail searches the host can request for a single entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    Whois,
    WhoisHistory,
    Pdns,
    Malware,
    Certificates,
    Pairs,
    Reputation,
    Articles,
    ArticlesById,
    Summary,
    Quota,
    Osint,
    Subdomains,
    Services,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Whois => "whois",
            SearchType::WhoisHistory => "whoisHistory",
            SearchType::Pdns => "pdns",
            SearchType::Malware => "malware",
            SearchType::Certificates => "certificates",
            SearchType::Pairs => "pairs",
            SearchType::Reputation => "reputation",
            SearchType::Articles => "articles",
            SearchType::ArticlesById => "articlesById",
            SearchType::Summary => "summary",
            SearchType::Quota => "quota",
            SearchType::Osint => "osint",
            SearchType::Subdomains => "subdomains",
            SearchType::Services => "services",
        }
    }

    /// The datasource a user must have enabled to run this search
    pub fn datasource(&self) -> Option<Datasource> {
        match self {
            SearchType::Pdns => Some(Datasource::Resolutions),
            SearchType::Pairs => Some(Datasource::HostPairs),
            SearchType::Malware => Some(Datasource::Malware),
            SearchType::Services => Some(Datasource::Services),
            SearchType::Reputation => Some(Datasource::Reputation),
            SearchType::Articles | SearchType::ArticlesById => Some(Datasource::Articles),
            SearchType::Certificates => Some(Datasource::SslCerts),
            SearchType::Osint => Some(Datasource::Osint),
            SearchType::Subdomains => Some(Datasource::Subdomains),
            SearchType::Whois
            | SearchType::WhoisHistory
            | SearchType::Summary
            | SearchType::Quota => None,
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-demand detail request sent by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub search_type: SearchType,
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default)]
    pub id: Option<String>,
}

impl MessagePayload {
    pub fn new(search_type: SearchType, entity: Entity) -> Self {
        Self {
            search_type,
            entity: Some(entity),
            id: None,
        }
    }
}

/// Reply to an on-demand detail request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub data: MessageData,
    /// Only present for quota searches and when a search limit was hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageData {
    SearchLimit(SearchLimitSignal),
    Result(Value),
}

impl MessageData {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            MessageData::Result(value) => Some(value),
            MessageData::SearchLimit(_) => None,
        }
    }
}
