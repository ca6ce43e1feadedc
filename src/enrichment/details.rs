//! On-demand detail searches for a single entity

use serde_json::{Value, json};

use super::{Enricher, LimitCounters, gateway_limit};
use crate::error::Error;
use crate::gateway::{ApiRequest, Credentials, GatewayError, endpoints, fetch};
use crate::models::vendor::{ArticleList, PdnsRecord, PdnsResult, ResultsPage, SubdomainList};
use crate::models::{
    Entity, EntityType, MessageData, MessagePayload, MessageResponse, Options, SearchType,
    WhoisRecord,
};
use crate::whois::compute_historical_whois_diff;

/// Subdomain lists are capped independently of `records`
pub const MAX_SUBDOMAINS: usize = 100;

impl Enricher {
    /// Run one detail search.
    ///
    /// A search that hits a limiter returns the limit signal together with the
    /// account quota instead of failing.
    pub async fn on_message(
        &self,
        payload: &MessagePayload,
        options: &Options,
    ) -> Result<MessageResponse, Error> {
        let search_type = payload.search_type;
        if let Some(datasource) = search_type.datasource() {
            if !options.datasource_enabled(datasource) {
                return Err(Error::DatasourceDisabled(search_type));
            }
        }

        let credentials = options.credentials();
        let records = options.records;

        let result = match search_type {
            SearchType::Quota => self.quota(&credentials).await,
            SearchType::ArticlesById => {
                let id = article_id(payload)?;
                self.raw(&credentials, ApiRequest::new(endpoints::article(id)))
                    .await
            }
            SearchType::Whois => self.whois(required_entity(payload)?, &credentials).await,
            SearchType::WhoisHistory => {
                self.whois_history(required_entity(payload)?, &credentials)
                    .await
            }
            SearchType::Pdns => {
                self.passive_dns(required_entity(payload)?, &credentials, records)
                    .await
            }
            SearchType::Malware => {
                self.results(endpoints::MALWARE, required_entity(payload)?, &credentials, records)
                    .await
            }
            SearchType::Osint => {
                self.results(endpoints::OSINT, required_entity(payload)?, &credentials, records)
                    .await
            }
            SearchType::Services => {
                self.results(endpoints::SERVICES, required_entity(payload)?, &credentials, records)
                    .await
            }
            SearchType::Certificates => {
                let entity = required_entity(payload)?;
                let field = certificate_field(entity)?;
                self.certificates(entity, field, &credentials, records)
                    .await
            }
            SearchType::Pairs => {
                let entity = required_entity(payload)?;
                self.host_pairs(&credentials, &entity.value, records)
                    .await
                    .map(Value::from)
            }
            SearchType::Reputation => {
                let entity = required_entity(payload)?;
                self.raw(&credentials, entity_request(endpoints::REPUTATION, entity))
                    .await
            }
            SearchType::Articles => {
                self.articles(required_entity(payload)?, &credentials, records)
                    .await
            }
            SearchType::Subdomains => {
                self.subdomains(required_entity(payload)?, &credentials)
                    .await
            }
            SearchType::Summary => {
                let entity = required_entity(payload)?;
                self.summary_job(entity, &credentials, records)
                    .await
                    .map(|result| json!(result.data.map(|data| data.summary).unwrap_or_default()))
            }
        };

        self.handle_result(search_type, result, &credentials).await
    }

    async fn handle_result(
        &self,
        search_type: SearchType,
        result: Result<Value, GatewayError>,
        credentials: &Credentials,
    ) -> Result<MessageResponse, Error> {
        let error = match result {
            Ok(value) => {
                let quota = (search_type == SearchType::Quota).then(|| value.clone());
                return Ok(MessageResponse {
                    data: MessageData::Result(value),
                    quota,
                });
            }
            Err(error) => error,
        };

        let Some(signal) = gateway_limit(&error) else {
            tracing::error!(
                search_type = %search_type,
                status = ?error.status_code(),
                error = %error,
                "Detail search failed"
            );
            return Err(Error::Gateway(error));
        };

        let mut counters = LimitCounters::default();
        counters.record(&signal);
        counters.log_summary();

        let quota = match self.quota(credentials).await {
            Ok(quota) => Some(quota),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to fetch quota after search limit");
                None
            }
        };

        Ok(MessageResponse {
            data: MessageData::SearchLimit(signal),
            quota,
        })
    }

    async fn quota(&self, credentials: &Credentials) -> Result<Value, GatewayError> {
        self.raw(credentials, ApiRequest::new(endpoints::ACCOUNT_QUOTA))
            .await
    }

    async fn whois(&self, entity: &Entity, credentials: &Credentials) -> Result<Value, GatewayError> {
        let request = match entity.entity_type {
            EntityType::Email => ApiRequest::new(endpoints::WHOIS_SEARCH)
                .query("query", &entity.value)
                .query("field", "email"),
            _ => entity_request(endpoints::WHOIS, entity),
        };
        self.raw(credentials, request).await
    }

    async fn whois_history(
        &self,
        entity: &Entity,
        credentials: &Credentials,
    ) -> Result<Value, GatewayError> {
        let page: Option<ResultsPage<WhoisRecord>> = fetch(
            self.api.as_ref(),
            credentials,
            entity_request(endpoints::WHOIS, entity).query("history", "true"),
        )
        .await?;

        let history = compute_historical_whois_diff(page.unwrap_or_default().results);
        Ok(json!({ "whoisData": history }))
    }

    async fn passive_dns(
        &self,
        entity: &Entity,
        credentials: &Credentials,
        records: usize,
    ) -> Result<Value, GatewayError> {
        let page: ResultsPage<PdnsRecord> = fetch(
            self.api.as_ref(),
            credentials,
            entity_request(endpoints::PASSIVE_DNS, entity),
        )
        .await?
        .unwrap_or_default();

        let total_records = page
            .extra
            .get("totalRecords")
            .and_then(Value::as_u64)
            .map(|total| total as usize)
            .unwrap_or(page.results.len());

        let mut pdns_data: Vec<PdnsRecord> = page
            .results
            .into_iter()
            .map(PdnsRecord::with_epoch_seconds)
            .collect();
        pdns_data.sort_by_key(|record| record.last_seen_seconds);
        pdns_data.truncate(records);

        Ok(json!(PdnsResult {
            pdns_data,
            total_records,
        }))
    }

    /// `{results}` endpoints shaped to the capped result list
    async fn results(
        &self,
        path: &str,
        entity: &Entity,
        credentials: &Credentials,
        records: usize,
    ) -> Result<Value, GatewayError> {
        let page: Option<ResultsPage<Value>> =
            fetch(self.api.as_ref(), credentials, entity_request(path, entity)).await?;

        let mut results = page.unwrap_or_default().results;
        results.truncate(records);
        Ok(Value::Array(results))
    }

    async fn certificates(
        &self,
        entity: &Entity,
        field: &'static str,
        credentials: &Credentials,
        records: usize,
    ) -> Result<Value, GatewayError> {
        let page: Option<ResultsPage<Value>> = fetch(
            self.api.as_ref(),
            credentials,
            entity_request(endpoints::SSL_CERTIFICATE_SEARCH, entity).query("field", field),
        )
        .await?;

        let mut results = page.unwrap_or_default().results;
        results.truncate(records);
        Ok(Value::Array(results))
    }

    async fn articles(
        &self,
        entity: &Entity,
        credentials: &Credentials,
        records: usize,
    ) -> Result<Value, GatewayError> {
        let list: Option<ArticleList> = fetch(
            self.api.as_ref(),
            credentials,
            entity_request(endpoints::ARTICLES_BY_INDICATOR, entity),
        )
        .await?;

        let mut articles = list.unwrap_or_default().articles;
        articles.truncate(records);
        Ok(json!(articles))
    }

    async fn subdomains(
        &self,
        entity: &Entity,
        credentials: &Credentials,
    ) -> Result<Value, GatewayError> {
        let list: Option<SubdomainList> = fetch(
            self.api.as_ref(),
            credentials,
            entity_request(endpoints::SUBDOMAINS, entity),
        )
        .await?;

        let mut list = list.unwrap_or_default();
        list.subdomains.truncate(MAX_SUBDOMAINS);
        Ok(json!(list))
    }
}

fn entity_request(path: &str, entity: &Entity) -> ApiRequest {
    ApiRequest::new(path).query("query", &entity.value)
}

fn required_entity(payload: &MessagePayload) -> Result<&Entity, Error> {
    payload
        .entity
        .as_ref()
        .ok_or(Error::MissingEntity(payload.search_type))
}

fn article_id(payload: &MessagePayload) -> Result<&str, Error> {
    let id = payload.id.as_deref().unwrap_or_default();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !valid {
        return Err(Error::InvalidPayload(format!(
            "articlesById requires an alphanumeric article id, got `{}`",
            id
        )));
    }
    Ok(id)
}

/// Certificate search field matching the entity type
fn certificate_field(entity: &Entity) -> Result<&'static str, Error> {
    match entity.entity_type {
        EntityType::Domain => Ok("subjectCommonName"),
        EntityType::Ipv4 => Ok("subjectAlternativeName"),
        EntityType::Email => Ok("subjectEmailAddress"),
        EntityType::Custom => Err(Error::InvalidPayload(
            "certificates searches need a domain, IPv4 or email entity".to_string(),
        )),
    }
}
