//! Typed PassiveTotal response shapes
//!
//! Every shape keeps unknown vendor fields in a flattened map so the host can
//! still render everything the API returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic `{results: [...]}` page returned by most endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsPage<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<T> Default for ResultsPage<T> {
    fn default() -> Self {
        Self {
            results: vec![],
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryCount {
    #[serde(default)]
    pub count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `data_summary` block of `/v2/cards/summary`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSummary {
    pub resolutions: SummaryCount,
    pub certificates: SummaryCount,
    pub hashes: SummaryCount,
    pub projects: SummaryCount,
    pub articles: SummaryCount,
    pub trackers: SummaryCount,
    pub components: SummaryCount,
    pub host_pairs: SummaryCount,
    pub cookies: SummaryCount,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataSummary {
    pub fn counts(&self) -> [(&'static str, u64); 9] {
        [
            ("Resolutions", self.resolutions.count),
            ("Certificates", self.certificates.count),
            ("Hashes", self.hashes.count),
            ("Projects", self.projects.count),
            ("Articles", self.articles.count),
            ("Trackers", self.trackers.count),
            ("Components", self.components.count),
            ("Host Pairs", self.host_pairs.count),
            ("Cookies", self.cookies.count),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.counts().iter().all(|(_, count)| *count == 0)
    }
}

/// Indicator card returned by `/v2/cards/summary`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardSummary {
    #[serde(default)]
    pub data_summary: DataSummary,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Passive DNS resolution record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdnsRecord {
    #[serde(default)]
    pub resolve: Option<String>,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub collected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_seconds: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PdnsRecord {
    /// Fill the derived epoch fields the host sorts on
    pub fn with_epoch_seconds(mut self) -> Self {
        self.first_seen_seconds = epoch_seconds(self.first_seen.as_deref());
        self.last_seen_seconds = epoch_seconds(self.last_seen.as_deref());
        self.collected_seconds = epoch_seconds(self.collected.as_deref());
        self
    }
}

/// Shaped passive DNS result handed to the host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdnsResult {
    pub pdns_data: Vec<PdnsRecord>,
    pub total_records: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleIndicator {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indicators: Vec<ArticleIndicator>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    /// Whether the article lists `value` among its indicators
    pub fn mentions(&self, value: &str) -> bool {
        self.indicators
            .iter()
            .flat_map(|indicator| indicator.values.iter())
            .any(|v| v.eq_ignore_ascii_case(value))
    }
}

/// `{articles: [...]}` list returned by the article endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleList {
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubdomainList {
    #[serde(default)]
    pub query_value: Option<String>,
    #[serde(default)]
    pub subdomains: Vec<String>,
}

/// A point-in-time WHOIS snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WhoisRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Parse the timestamp formats PassiveTotal uses
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn epoch_seconds(value: Option<&str>) -> Option<i64> {
    value.and_then(parse_timestamp).map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = 1_559_001_600; // 2019-05-28T00:00:00Z
        assert_eq!(parse_timestamp("2019-05-28T00:00:00Z").unwrap().timestamp(), expected);
        assert_eq!(
            parse_timestamp("2019-05-27T17:00:00.000-0700").unwrap().timestamp(),
            expected
        );
        assert_eq!(parse_timestamp("2019-05-28 00:00:00").unwrap().timestamp(), expected);
        assert_eq!(parse_timestamp("2019-05-28").unwrap().timestamp(), expected);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_article_keeps_vendor_shape() {
        let sparse = json!({ "guid": "a1", "summary": "text" });
        let article: Article = serde_json::from_value(sparse.clone()).unwrap();
        assert_eq!(serde_json::to_value(&article).unwrap(), sparse);

        let full = json!({
            "guid": "a2",
            "title": "Campaign",
            "indicators": [{ "type": "domain", "values": ["example.com"] }]
        });
        let article: Article = serde_json::from_value(full.clone()).unwrap();
        assert!(article.mentions("EXAMPLE.com"));
        assert_eq!(serde_json::to_value(&article).unwrap(), full);
    }

    #[test]
    fn test_card_summary_counts() {
        let card: CardSummary = serde_json::from_value(json!({
            "name": "example.com",
            "data_summary": {
                "resolutions": { "count": 3, "link": "https://community.riskiq.com" },
                "host_pairs": { "count": 1 }
            }
        }))
        .unwrap();

        assert!(!card.data_summary.is_empty());
        assert_eq!(card.data_summary.resolutions.count, 3);
        assert_eq!(card.data_summary.hashes.count, 0);
        assert_eq!(card.extra["name"], json!("example.com"));
        assert!(CardSummary::default().data_summary.is_empty());
    }

    #[test]
    fn test_pdns_epoch_seconds() {
        let record: PdnsRecord = serde_json::from_value(json!({
            "resolve": "1.2.3.4",
            "firstSeen": "2019-05-28 00:00:00",
            "lastSeen": "2019-05-29 00:00:00",
            "recordType": "A"
        }))
        .unwrap();
        let record = record.with_epoch_seconds();

        assert_eq!(record.first_seen_seconds, Some(1_559_001_600));
        assert_eq!(record.last_seen_seconds, Some(1_559_088_000));
        assert_eq!(record.collected_seconds, None);
        assert_eq!(record.extra["recordType"], json!("A"));
    }

    #[test]
    fn test_article_mentions() {
        let article: Article = serde_json::from_value(json!({
            "guid": "a1",
            "title": "Campaign",
            "indicators": [{ "type": "domain", "count": 1, "values": ["Evil.com"] }]
        }))
        .unwrap();

        assert!(article.mentions("evil.com"));
        assert!(!article.mentions("good.com"));
    }
}
