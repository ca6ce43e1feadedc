//! Per-call user options and their validation

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;
use validator::Validate;

use crate::gateway::Credentials;

pub const DEFAULT_HOST: &str = "https://api.passivetotal.org";

/// Datasources a user can enable in the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Datasource {
    Resolutions,
    HostPairs,
    Malware,
    Services,
    Reputation,
    Articles,
    SslCerts,
    Osint,
    Subdomains,
}

impl std::str::FromStr for Datasource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolutions" => Ok(Datasource::Resolutions),
            "hostPairs" => Ok(Datasource::HostPairs),
            "malware" => Ok(Datasource::Malware),
            "services" => Ok(Datasource::Services),
            "reputation" => Ok(Datasource::Reputation),
            "articles" => Ok(Datasource::Articles),
            "sslCerts" => Ok(Datasource::SslCerts),
            "osint" => Ok(Datasource::Osint),
            "subdomains" => Ok(Datasource::Subdomains),
            other => Err(format!("unknown datasource `{}`", other)),
        }
    }
}

/// Configuration snapshot supplied with every call
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub host: String,
    pub user: String,
    pub api_key: String,
    /// Result cap applied to every list the vendor returns
    pub records: usize,
    /// Literal values (lowercased) that are never looked up
    #[serde(alias = "blacklist", deserialize_with = "deserialize_blocklist")]
    pub blocklist: BTreeSet<String>,
    #[serde(alias = "domainBlacklistRegex")]
    pub domain_blocklist_regex: String,
    #[serde(alias = "ipBlacklistRegex")]
    pub ip_blocklist_regex: String,
    pub max_concurrent: usize,
    /// Minimum milliseconds between two request dispatches
    pub min_time: u64,
    pub enable_rep: bool,
    pub enable_pairs: bool,
    #[serde(deserialize_with = "deserialize_datasources")]
    pub enabled_datasources: Vec<Datasource>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            user: String::new(),
            api_key: String::new(),
            records: 10,
            blocklist: BTreeSet::new(),
            domain_blocklist_regex: String::new(),
            ip_blocklist_regex: String::new(),
            max_concurrent: 10,
            min_time: 1,
            enable_rep: false,
            enable_pairs: false,
            enabled_datasources: vec![],
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .field("records", &self.records)
            .field("blocklist", &self.blocklist)
            .field("domain_blocklist_regex", &self.domain_blocklist_regex)
            .field("ip_blocklist_regex", &self.ip_blocklist_regex)
            .field("max_concurrent", &self.max_concurrent)
            .field("min_time", &self.min_time)
            .field("enable_rep", &self.enable_rep)
            .field("enable_pairs", &self.enable_pairs)
            .field("enabled_datasources", &self.enabled_datasources)
            .finish()
    }
}

impl Options {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            user: self.user.clone(),
            api_key: self.api_key.clone(),
        }
    }

    /// An empty datasource list is treated as "everything enabled"
    pub fn datasource_enabled(&self, datasource: Datasource) -> bool {
        self.enabled_datasources.is_empty() || self.lists_datasource(datasource)
    }

    /// True only when the user explicitly enabled the datasource
    pub fn lists_datasource(&self, datasource: Datasource) -> bool {
        self.enabled_datasources.contains(&datasource)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlocklistInput {
    List(Vec<String>),
    Text(String),
}

fn deserialize_blocklist<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<BlocklistInput>::deserialize(deserializer)?;
    let values: Vec<String> = match input {
        None => vec![],
        Some(BlocklistInput::List(values)) => values,
        Some(BlocklistInput::Text(text)) => text
            .split(|c| c == ',' || c == '\n')
            .map(str::to_string)
            .collect(),
    };

    Ok(values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasourceInput {
    Name(String),
    Select { value: String },
}

fn deserialize_datasources<'de, D>(deserializer: D) -> Result<Vec<Datasource>, D::Error>
where
    D: Deserializer<'de>,
{
    let inputs = Option::<Vec<DatasourceInput>>::deserialize(deserializer)?.unwrap_or_default();

    let mut datasources = vec![];
    for input in inputs {
        let name = match input {
            DatasourceInput::Name(name) | DatasourceInput::Select { value: name } => name,
        };
        match name.parse::<Datasource>() {
            Ok(datasource) if !datasources.contains(&datasource) => datasources.push(datasource),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Ignoring datasource"),
        }
    }

    Ok(datasources)
}

/// A single option validation failure reported back to the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionError {
    pub key: String,
    pub message: String,
}

impl OptionError {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Validate)]
struct RequiredCredentials {
    #[validate(length(min = 1, message = "You must provide a PassiveTotal API key"))]
    api_key: String,
    #[validate(length(min = 1, message = "You must provide a PassiveTotal Username"))]
    user: String,
}

/// Validate the host's user options map (`{key: {value}}`) before any network activity
pub fn validate_options(user_options: &Map<String, Value>) -> Vec<OptionError> {
    let mut errors = vec![];

    let credentials = RequiredCredentials {
        api_key: option_str(user_options, &["apiKey"]).unwrap_or_default().to_string(),
        user: option_str(user_options, &["user"]).unwrap_or_default().to_string(),
    };

    if let Err(validation) = credentials.validate() {
        let field_errors = validation.field_errors();
        for (field, key) in [("api_key", "apiKey"), ("user", "user")] {
            let Some(failures) = field_errors.get(field) else {
                continue;
            };
            for failure in failures.iter() {
                let message = failure
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is required", key));
                errors.push(OptionError::new(key, message));
            }
        }
    }

    if let Some(host) = option_str(user_options, &["host"]).filter(|h| !h.is_empty()) {
        let valid = Url::parse(host)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        if !valid {
            errors.push(OptionError::new(
                "host",
                "The PassiveTotal API URL must include the schema (i.e., https://)",
            ));
        }
    }

    for (key, legacy) in [
        ("domainBlocklistRegex", "domainBlacklistRegex"),
        ("ipBlocklistRegex", "ipBlacklistRegex"),
    ] {
        let Some(pattern) = option_str(user_options, &[key, legacy]).filter(|p| !p.is_empty())
        else {
            continue;
        };
        if let Err(e) = Regex::new(pattern) {
            errors.push(OptionError::new(key, format!("Invalid regex: {}", e)));
        }
    }

    errors
}

fn option_str<'a>(user_options: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        user_options
            .get(*key)
            .and_then(|option| option.get("value"))
            .and_then(Value::as_str)
    })
}
