//! Historical WHOIS reduction
//!
//! Snapshots are sorted newest first and each one is compared with the next
//! older snapshot. Snapshots that carry no material change are merged away, so
//! only records where something an analyst cares about changed are kept.
//!
//! Change categories:
//! - email: [`EMAIL_FIELDS`]
//! - phone: [`PHONE_FIELDS`]
//! - org: [`ORG_FIELDS`]
//! - nameServers: the `nameServers` list, ignoring order
//! - whoisServer: [`SERVER_FIELDS`]

pub mod diff;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::WhoisRecord;
use crate::models::vendor::parse_timestamp;

pub const SERVER_FIELDS: [&str; 3] = ["domainStatus", "whoisServer", "registrar"];

pub const EMAIL_FIELDS: [&str; 5] = [
    "contactEmail",
    "admin.email",
    "tech.email",
    "billing.email",
    "registrant.email",
];

pub const PHONE_FIELDS: [&str; 10] = [
    "admin.telephone",
    "admin.fax",
    "tech.telephone",
    "tech.fax",
    "billing.telephone",
    "billing.fax",
    "registrant.telephone",
    "registrant.fax",
    "fax",
    "telephone",
];

pub const ORG_FIELDS: [&str; 28] = [
    "admin.country",
    "admin.organization",
    "admin.state",
    "admin.city",
    "admin.street",
    "admin.postalCode",
    "admin.name",
    "billing.country",
    "billing.organization",
    "billing.state",
    "billing.city",
    "billing.street",
    "billing.postalCode",
    "billing.name",
    "tech.country",
    "tech.organization",
    "tech.state",
    "tech.city",
    "tech.street",
    "tech.postalCode",
    "tech.name",
    "registrant.country",
    "registrant.organization",
    "registrant.state",
    "registrant.city",
    "registrant.street",
    "registrant.postalCode",
    "registrant.name",
];

/// Date fields that change on every snapshot and never count as a change
const DATE_FIELDS: [&str; 4] = ["expiresAt", "lastLoadedAt", "registered", "registryUpdatedAt"];

const NAME_SERVERS: &str = "nameServers";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub email: bool,
    pub phone: bool,
    pub name_servers: bool,
    pub org: bool,
    pub whois_server: bool,
}

impl DiffSummary {
    /// Summary used for the oldest known record
    pub fn all() -> Self {
        Self {
            email: true,
            phone: true,
            name_servers: true,
            org: true,
            whois_server: true,
        }
    }
}

/// A kept snapshot and what changed relative to the next older kept snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WhoisDiffEntry {
    pub data: WhoisRecord,
    pub diff: Option<Value>,
    pub diff_summary: DiffSummary,
}

/// Reduce raw WHOIS history to the snapshots where something material changed.
///
/// Output is newest first; the oldest snapshot is always last, with no diff
/// and every category flagged.
pub fn compute_historical_whois_diff(records: Vec<WhoisRecord>) -> Vec<WhoisDiffEntry> {
    let records = sort_by_update_time(records);

    let Some(oldest) = records.len().checked_sub(1) else {
        return vec![];
    };

    let views: Vec<Value> = records.iter().map(comparison_view).collect();

    let mut reduced = vec![];
    let mut source = 0;
    for target in 1..views.len() {
        let Some(delta) = diff::diff(&views[target], &views[source]).and_then(scrub) else {
            continue;
        };

        tracing::trace!(source, target, "WHOIS snapshot changed");
        reduced.push(WhoisDiffEntry {
            data: records[source].clone(),
            diff_summary: summarize(&delta),
            diff: Some(delta),
        });
        source = target;
    }

    reduced.push(WhoisDiffEntry {
        data: records[oldest].clone(),
        diff: None,
        diff_summary: DiffSummary::all(),
    });

    tracing::debug!(
        total = records.len(),
        kept = reduced.len(),
        "Reduced WHOIS history"
    );

    reduced
}

/// Drop undated snapshots, null out empty objects and sort newest first.
///
/// Equal timestamps are ordered by the record's canonical JSON so the output
/// never depends on input order.
fn sort_by_update_time(records: Vec<WhoisRecord>) -> Vec<WhoisRecord> {
    let mut dated: Vec<(i64, String, WhoisRecord)> = records
        .into_iter()
        .filter_map(|mut record| {
            let updated_at = record
                .registry_updated_at
                .as_deref()
                .and_then(parse_timestamp);
            let Some(updated_at) = updated_at else {
                tracing::debug!(
                    registry_updated_at = ?record.registry_updated_at,
                    "Skipping WHOIS snapshot without a usable registryUpdatedAt"
                );
                return None;
            };

            for value in record.fields.values_mut() {
                if value.as_object().is_some_and(Map::is_empty) {
                    *value = Value::Null;
                }
            }

            let canonical = serde_json::to_string(&record).unwrap_or_default();
            Some((updated_at.timestamp_millis(), canonical, record))
        })
        .collect();

    dated.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    dated.into_iter().map(|(_, _, record)| record).collect()
}

/// Copy of a record with dates removed and phone numbers reduced to digits
fn comparison_view(record: &WhoisRecord) -> Value {
    let mut view = Value::Object(record.fields.clone());

    if let Value::Object(map) = &mut view {
        for field in DATE_FIELDS {
            map.remove(field);
        }
    }

    for field in PHONE_FIELDS {
        if let Some(Value::String(phone)) = lookup_mut(&mut view, field) {
            phone.retain(|c| c.is_ascii_digit());
        }
    }

    view
}

/// Remove deltas that are not material changes; `None` when nothing is left
fn scrub(delta: Value) -> Option<Value> {
    let Value::Object(mut map) = delta else {
        return Some(delta);
    };

    let name_servers_unchanged = match map.get_mut(NAME_SERVERS) {
        Some(Value::Object(entries)) if is_array_delta(entries) => {
            entries.retain(|key, entry| key != "_t" && !diff::is_move(entry));
            entries.is_empty()
        }
        _ => false,
    };
    if name_servers_unchanged {
        map.remove(NAME_SERVERS);
    }

    let mut delta = Value::Object(map);
    for field in ORG_FIELDS.iter().chain(SERVER_FIELDS.iter()) {
        if is_casing_change(lookup(&delta, field)) {
            remove_path(&mut delta, field);
        }
    }

    let Value::Object(mut map) = delta else {
        return None;
    };
    map.retain(|_, entry| match entry {
        Value::Object(nested) => !nested.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    });

    (!map.is_empty()).then_some(Value::Object(map))
}

fn summarize(delta: &Value) -> DiffSummary {
    let changed = |fields: &[&str]| fields.iter().any(|field| path_changed(delta, field));

    DiffSummary {
        email: changed(&EMAIL_FIELDS),
        phone: changed(&PHONE_FIELDS),
        name_servers: delta.get(NAME_SERVERS).is_some(),
        org: changed(&ORG_FIELDS),
        whois_server: changed(&SERVER_FIELDS),
    }
}

fn is_array_delta(entries: &Map<String, Value>) -> bool {
    entries.get("_t").and_then(Value::as_str) == Some("a")
}

/// A `[old, new]` pair of strings that differ only in case
fn is_casing_change(delta: Option<&Value>) -> bool {
    match delta.and_then(Value::as_array).map(Vec::as_slice) {
        Some([Value::String(old), Value::String(new)]) => old.to_lowercase() == new.to_lowercase(),
        _ => false,
    }
}

/// Whether the delta touches `path`.
///
/// When a whole contact block was added, removed or replaced the delta stops
/// at the block, so the field is looked up inside the block's values instead.
fn path_changed(delta: &Value, path: &str) -> bool {
    let mut current = delta;
    let mut segments = path.split('.');

    while let Some(segment) = segments.next() {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return false,
            },
            Value::Array(sides) => {
                let rest: Vec<&str> = std::iter::once(segment).chain(segments.by_ref()).collect();
                let rest = rest.join(".");
                return sides
                    .iter()
                    .any(|side| lookup(side, &rest).is_some_and(|v| !v.is_null()));
            }
            _ => return false,
        }
    }

    true
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}

fn remove_path(value: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (lookup_mut(value, parent), leaf),
        None => (Some(value), path),
    };

    if let Some(Value::Object(map)) = parent {
        map.remove(leaf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(updated_at: &str, fields: Value) -> WhoisRecord {
        let mut record: WhoisRecord = serde_json::from_value(fields).unwrap();
        record.registry_updated_at = Some(updated_at.to_string());
        record
    }

    fn base(org: &str, phone: &str) -> Value {
        json!({
            "domain": "example.com",
            "registrar": "Example Registrar, Inc.",
            "whoisServer": "whois.example.com",
            "nameServers": ["ns1.example.com", "ns2.example.com"],
            "registered": "2001-01-01T00:00:00.000-0800",
            "expiresAt": "2030-01-01T00:00:00.000-0800",
            "admin": {
                "name": "Jane Doe",
                "organization": org,
                "email": "admin@example.com",
                "telephone": phone
            }
        })
    }

    #[test]
    fn test_empty_history() {
        assert!(compute_historical_whois_diff(vec![]).is_empty());
    }

    #[test]
    fn test_single_record_is_the_first_known_record() {
        let reduced = compute_historical_whois_diff(vec![record(
            "2020-01-01T00:00:00.000-0800",
            base("Example Org", "15550000000"),
        )]);

        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].diff, None);
        assert_eq!(reduced[0].diff_summary, DiffSummary::all());
    }

    #[test]
    fn test_phone_formatting_is_not_a_change() {
        let reduced = compute_historical_whois_diff(vec![
            record("2020-01-01T00:00:00.000-0800", base("Example Org", "+1 (555) 000-0000")),
            record("2021-01-01T00:00:00.000-0800", base("Example Org", "15550000000")),
        ]);

        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].diff, None);
    }

    #[test]
    fn test_org_change_keeps_first_and_last() {
        let mut records = vec![record("2023-01-01T00:00:00Z", base("New Org", "1"))];
        for year in 2015..2023 {
            records.push(record(&format!("{}-01-01T00:00:00Z", year), base("Old Org", "1")));
        }

        let reduced = compute_historical_whois_diff(records);

        assert_eq!(reduced.len(), 2);
        assert_eq!(
            reduced[0].data.registry_updated_at.as_deref(),
            Some("2023-01-01T00:00:00Z")
        );
        assert!(reduced[0].diff_summary.org);
        assert!(!reduced[0].diff_summary.email);
        assert!(!reduced[0].diff_summary.phone);
        assert_eq!(
            reduced[0].diff,
            Some(json!({ "admin": { "organization": ["Old Org", "New Org"] } }))
        );
        assert_eq!(
            reduced[1].data.registry_updated_at.as_deref(),
            Some("2015-01-01T00:00:00Z")
        );
        assert_eq!(reduced[1].diff_summary, DiffSummary::all());
    }

    #[test]
    fn test_output_independent_of_input_order() {
        let records = vec![
            record("2019-01-01T00:00:00Z", base("A Org", "1")),
            record("2020-01-01T00:00:00Z", base("B Org", "1")),
            record("2020-01-01T00:00:00Z", base("C Org", "1")),
            record("2021-01-01T00:00:00Z", base("B Org", "2")),
            record("2022-01-01T00:00:00Z", base("D Org", "2")),
        ];
        let mut shuffled = records.clone();
        shuffled.reverse();
        shuffled.swap(0, 3);

        assert_eq!(
            compute_historical_whois_diff(records),
            compute_historical_whois_diff(shuffled)
        );
    }

    #[test]
    fn test_name_server_reorder_is_ignored() {
        let mut newer = base("Example Org", "1");
        newer["nameServers"] = json!(["ns2.example.com", "ns1.example.com"]);

        let reduced = compute_historical_whois_diff(vec![
            record("2020-01-01T00:00:00Z", base("Example Org", "1")),
            record("2021-01-01T00:00:00Z", newer),
        ]);

        assert_eq!(reduced.len(), 1);
    }

    #[test]
    fn test_name_server_addition_is_a_change() {
        let mut newer = base("Example Org", "1");
        newer["nameServers"] = json!(["ns1.example.com", "ns2.example.com", "ns3.example.com"]);

        let reduced = compute_historical_whois_diff(vec![
            record("2020-01-01T00:00:00Z", base("Example Org", "1")),
            record("2021-01-01T00:00:00Z", newer),
        ]);

        assert_eq!(reduced.len(), 2);
        assert_eq!(
            reduced[0].diff_summary,
            DiffSummary {
                name_servers: true,
                ..DiffSummary::default()
            }
        );
    }

    #[test]
    fn test_casing_change_is_ignored() {
        let mut newer = base("EXAMPLE ORG", "1");
        newer["registrar"] = json!("EXAMPLE REGISTRAR, INC.");

        let reduced = compute_historical_whois_diff(vec![
            record("2020-01-01T00:00:00Z", base("Example Org", "1")),
            record("2021-01-01T00:00:00Z", newer),
        ]);

        assert_eq!(reduced.len(), 1);
    }

    #[test]
    fn test_added_contact_block_is_categorized() {
        let mut newer = base("Example Org", "1");
        newer["tech"] = json!({ "email": "tech@example.com", "city": "Austin" });

        let reduced = compute_historical_whois_diff(vec![
            record("2020-01-01T00:00:00Z", base("Example Org", "1")),
            record("2021-01-01T00:00:00Z", newer),
        ]);

        assert_eq!(reduced.len(), 2);
        let summary = reduced[0].diff_summary;
        assert!(summary.email);
        assert!(summary.org);
        assert!(!summary.phone);
    }

    #[test]
    fn test_undated_records_and_empty_objects() {
        let mut undated: WhoisRecord = serde_json::from_value(base("Example Org", "1")).unwrap();
        undated.registry_updated_at = None;
        let mut blank = record("2020-01-01T00:00:00Z", base("Example Org", "1"));
        blank.registry_updated_at = Some(String::new());

        let mut fields = base("Example Org", "1");
        fields["billing"] = json!({});
        let dated = record("2021-01-01T00:00:00Z", fields);

        let reduced = compute_historical_whois_diff(vec![undated, blank, dated]);

        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].data.fields["billing"], Value::Null);
    }
}
