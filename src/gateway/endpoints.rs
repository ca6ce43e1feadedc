//! PassiveTotal v2 endpoint paths

pub const PASSIVE_DNS: &str = "/v2/dns/passive";
pub const WHOIS: &str = "/v2/whois";
pub const WHOIS_SEARCH: &str = "/v2/whois/search";
pub const MALWARE: &str = "/v2/enrichment/malware";
pub const OSINT: &str = "/v2/enrichment/osint";
pub const SUBDOMAINS: &str = "/v2/enrichment/subdomains";
pub const REPUTATION: &str = "/v2/reputation";
pub const SSL_CERTIFICATE_SEARCH: &str = "/v2/ssl-certificate/search";
pub const HOST_PAIRS: &str = "/v2/host-attributes/pairs";
pub const ARTICLES: &str = "/v2/articles";
pub const ARTICLES_BY_INDICATOR: &str = "/v2/articles/indicator";
pub const CARD_SUMMARY: &str = "/v2/cards/summary";
pub const TRACKER_SEARCH: &str = "/v2/trackers/search";
pub const SERVICES: &str = "/v2/services";
pub const ACCOUNT_QUOTA: &str = "/v2/account/quota";

pub fn article(id: &str) -> String {
    format!("{}/{}", ARTICLES, id)
}
