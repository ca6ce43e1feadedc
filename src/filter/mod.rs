//! Entity validation and blocklisting, applied before any network call

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::error::Error;
use crate::models::{Entity, Options};

pub const MAX_ENTITY_LENGTH: usize = 100;
pub const MAX_DOMAIN_LABEL_LENGTH: usize = 63;
pub const IGNORED_IPS: [&str; 3] = ["127.0.0.1", "255.255.255.255", "0.0.0.0"];

/// A regex compiled from an option string, rebuilt only when the string changes
#[derive(Debug, Default)]
struct CompiledPattern {
    source: String,
    regex: Option<Regex>,
}

impl CompiledPattern {
    fn refresh(&mut self, source: &str, option: &'static str) -> Result<(), Error> {
        if source == self.source {
            return Ok(());
        }

        if source.is_empty() {
            tracing::debug!(option, "Removing blocklist regex filtering");
            self.source.clear();
            self.regex = None;
            return Ok(());
        }

        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::InvalidRegex {
                option,
                pattern: source.to_string(),
                source: e,
            })?;

        tracing::debug!(option, pattern = source, "Modifying blocklist regex");
        self.source = source.to_string();
        self.regex = Some(regex);
        Ok(())
    }
}

/// Memoized domain and IP blocklist regexes
#[derive(Debug, Default)]
pub struct BlocklistRegexes {
    domain: CompiledPattern,
    ip: CompiledPattern,
}

impl BlocklistRegexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompile whichever regex option changed since the last call.
    ///
    /// An invalid pattern leaves the previously compiled regex in place.
    pub fn refresh(&mut self, options: &Options) -> Result<(), Error> {
        self.domain
            .refresh(&options.domain_blocklist_regex, "domainBlocklistRegex")?;
        self.ip.refresh(&options.ip_blocklist_regex, "ipBlocklistRegex")?;
        Ok(())
    }

    pub fn domain_pattern(&self) -> Option<&str> {
        self.domain.regex.as_ref().map(Regex::as_str)
    }

    pub fn ip_pattern(&self) -> Option<&str> {
        self.ip.regex.as_ref().map(Regex::as_str)
    }

    /// Snapshot the current regexes into a filter for one batch
    pub fn filter<'a>(&self, options: &'a Options) -> EntityFilter<'a> {
        EntityFilter {
            blocklist: &options.blocklist,
            domain_regex: self.domain.regex.clone(),
            ip_regex: self.ip.regex.clone(),
        }
    }
}

/// Pure accept/reject predicate over entities
#[derive(Debug, Clone)]
pub struct EntityFilter<'a> {
    blocklist: &'a BTreeSet<String>,
    domain_regex: Option<Regex>,
    ip_regex: Option<Regex>,
}

impl EntityFilter<'_> {
    pub fn is_acceptable(&self, entity: &Entity) -> bool {
        !is_invalid_entity(entity) && !self.is_blocklisted(entity)
    }

    fn is_blocklisted(&self, entity: &Entity) -> bool {
        if self.blocklist.contains(&entity.value.to_lowercase()) {
            tracing::debug!(entity = %entity.value, "Blocked blocklisted entity");
            return true;
        }

        if entity.is_ip() && !entity.is_private_ip {
            if let Some(regex) = &self.ip_regex {
                if regex.is_match(&entity.value) {
                    tracing::debug!(ip = %entity.value, "Blocked blocklisted IP lookup");
                    return true;
                }
            }
        }

        if entity.is_domain() {
            if let Some(regex) = &self.domain_regex {
                if regex.is_match(&entity.value) {
                    tracing::debug!(domain = %entity.value, "Blocked blocklisted domain lookup");
                    return true;
                }
            }
        }

        false
    }
}

/// Structural checks that do not depend on any option
pub fn is_invalid_entity(entity: &Entity) -> bool {
    if entity.value.chars().count() > MAX_ENTITY_LENGTH {
        return true;
    }

    // DNS labels are capped at 63 characters
    if entity.is_domain()
        && entity
            .value
            .split('.')
            .any(|label| label.chars().count() > MAX_DOMAIN_LABEL_LENGTH)
    {
        return true;
    }

    entity.is_ip() && IGNORED_IPS.contains(&entity.value.as_str())
}
