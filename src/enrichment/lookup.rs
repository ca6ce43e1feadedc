//! Batch lookups

use futures::future::join_all;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::{Enricher, LimitCounters, SearchFailure, reached_search_limit};
use crate::error::{EntityError, Error};
use crate::gateway::{ApiRequest, Credentials, GatewayError, endpoints, fetch};
use crate::models::vendor::ResultsPage;
use crate::models::{
    Article, CardSummary, Datasource, DetailsSummary, Entity, EntityType, LookupData,
    LookupDetails, LookupResult, Options,
};

impl Enricher {
    /// Look up a batch of entities.
    ///
    /// Filtered entities are left out of the output. Limiter conditions become
    /// volatile results; any other failure fails the whole batch with every
    /// entity error collected.
    pub async fn do_lookup(
        &self,
        entities: &[Entity],
        options: &Options,
    ) -> Result<Vec<LookupResult>, Error> {
        let span = tracing::info_span!(
            "lookup",
            batch_id = %Uuid::new_v4(),
            entities = entities.len()
        );
        self.lookup_batch(entities, options).instrument(span).await
    }

    async fn lookup_batch(
        &self,
        entities: &[Entity],
        options: &Options,
    ) -> Result<Vec<LookupResult>, Error> {
        let accepted: Vec<&Entity> = {
            let mut blocklists = self.blocklists();
            blocklists.refresh(options)?;
            let filter = blocklists.filter(options);
            entities.iter().filter(|e| filter.is_acceptable(e)).collect()
        };

        if accepted.len() < entities.len() {
            tracing::debug!(
                blocked = entities.len() - accepted.len(),
                "Skipping invalid or blocklisted entities"
            );
        }
        if accepted.is_empty() {
            return Ok(vec![]);
        }

        let scheduler = self.scheduler(options);
        let credentials = options.credentials();

        let articles = if options.lists_datasource(Datasource::Articles) {
            match self.recent_articles(scheduler, &credentials).await {
                Ok(articles) => Some(articles),
                Err(failure) => {
                    tracing::warn!(error = ?failure, "Failed to load recent articles");
                    None
                }
            }
        } else {
            None
        };

        let outcomes = join_all(accepted.into_iter().map(|entity| {
            let credentials = &credentials;
            async move {
                let outcome = match scheduler
                    .submit(self.lookup_job(entity, options, credentials))
                    .await
                {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(error)) => Err(SearchFailure::Gateway(error)),
                    Err(dropped) => Err(SearchFailure::from(dropped)),
                };
                (entity, outcome)
            }
        }))
        .await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut errors = vec![];
        let mut counters = LimitCounters::default();

        for (entity, outcome) in outcomes {
            let failure = match outcome {
                Ok(mut result) => {
                    if let Some(articles) = &articles {
                        attach_articles(&mut result, articles, options.records);
                    }
                    results.push(result);
                    continue;
                }
                Err(failure) => failure,
            };

            if let Some(signal) = reached_search_limit(&failure) {
                tracing::debug!(entity = %entity.value, ?signal, "Search limit reached");
                counters.record(&signal);
                results.push(LookupResult::search_limit(entity.clone(), signal));
            } else if let SearchFailure::Gateway(error) = failure {
                tracing::error!(
                    entity = %entity.value,
                    status = ?error.status_code(),
                    error = %error,
                    "Lookup failed"
                );
                errors.push(EntityError {
                    entity: entity.clone(),
                    error,
                });
            }
        }

        counters.log_summary();

        if !errors.is_empty() {
            return Err(Error::Batch(errors));
        }

        tracing::info!(results = results.len(), "Lookup complete");
        Ok(results)
    }

    /// One entity's vendor calls, run inside a single scheduler slot
    async fn lookup_job(
        &self,
        entity: &Entity,
        options: &Options,
        credentials: &Credentials,
    ) -> Result<LookupResult, GatewayError> {
        if entity.entity_type == EntityType::Custom {
            return self.trackers(entity, credentials, options.records).await;
        }

        let card = self.card(entity, credentials);
        let reputation = async {
            if !options.enable_rep {
                return Ok(None);
            }
            self.api
                .get(
                    credentials,
                    ApiRequest::new(endpoints::REPUTATION).query("query", &entity.value),
                )
                .await
        };
        let pairs = async {
            if !options.enable_pairs {
                return Ok(None);
            }
            self.host_pairs(credentials, &entity.value, options.records)
                .await
                .map(Some)
        };

        let (card, reputation, pairs) = futures::try_join!(card, reputation, pairs)?;
        Ok(shape_card(entity, card, reputation, pairs))
    }

    /// The card or tracker summary alone, without reputation or host pairs
    pub(crate) async fn summary_job(
        &self,
        entity: &Entity,
        credentials: &Credentials,
        records: usize,
    ) -> Result<LookupResult, GatewayError> {
        if entity.entity_type == EntityType::Custom {
            return self.trackers(entity, credentials, records).await;
        }

        let card = self.card(entity, credentials).await?;
        Ok(shape_card(entity, card, None, None))
    }

    async fn card(
        &self,
        entity: &Entity,
        credentials: &Credentials,
    ) -> Result<Option<CardSummary>, GatewayError> {
        fetch(
            self.api.as_ref(),
            credentials,
            ApiRequest::new(endpoints::CARD_SUMMARY).query("query", &entity.value),
        )
        .await
    }

    async fn trackers(
        &self,
        entity: &Entity,
        credentials: &Credentials,
        records: usize,
    ) -> Result<LookupResult, GatewayError> {
        let page: Option<ResultsPage<Value>> = fetch(
            self.api.as_ref(),
            credentials,
            ApiRequest::new(endpoints::TRACKER_SEARCH).query("query", &entity.value),
        )
        .await?;
        Ok(shape_trackers(entity, page, records))
    }
}

/// Shape a card summary into a lookup result; all-zero counts are a miss
pub fn shape_card(
    entity: &Entity,
    card: Option<CardSummary>,
    reputation: Option<Value>,
    pairs: Option<Vec<Value>>,
) -> LookupResult {
    let Some(card) = card.filter(|card| !card.data_summary.is_empty()) else {
        return LookupResult::miss(entity.clone());
    };

    let counts = card
        .data_summary
        .counts()
        .iter()
        .map(|(label, count)| format!("{}: {}", label, count))
        .collect::<Vec<_>>()
        .join(", ");
    let mut summary = vec![counts];

    match reputation.as_ref().and_then(|r| r.get("score")) {
        Some(Value::String(score)) => summary.push(format!("Reputation: {}", score)),
        Some(score @ Value::Number(_)) => summary.push(format!("Reputation: {}", score)),
        _ => {}
    }

    LookupResult::hit(
        entity.clone(),
        LookupData {
            summary,
            details: LookupDetails {
                summary: Some(DetailsSummary::Card(card)),
                reputation,
                pairs: pairs.filter(|pairs| !pairs.is_empty()),
                ..LookupDetails::default()
            },
        },
    )
}

/// Shape a tracker search; the tag counts every tracker the vendor returned
pub fn shape_trackers(
    entity: &Entity,
    page: Option<ResultsPage<Value>>,
    records: usize,
) -> LookupResult {
    let Some(mut trackers) = page.map(|page| page.results).filter(|r| !r.is_empty()) else {
        return LookupResult::miss(entity.clone());
    };

    let summary = vec![format!("Trackers:{}", trackers.len())];
    trackers.truncate(records);

    LookupResult::hit(
        entity.clone(),
        LookupData {
            summary,
            details: LookupDetails {
                trackers: Some(trackers),
                ..LookupDetails::default()
            },
        },
    )
}

fn attach_articles(result: &mut LookupResult, articles: &[Article], records: usize) {
    let value = result.entity.value.clone();
    let Some(data) = result.data.as_mut() else {
        return;
    };

    let mentioned: Vec<Article> = articles
        .iter()
        .filter(|article| article.mentions(&value))
        .take(records)
        .cloned()
        .collect();

    if !mentioned.is_empty() {
        data.details.recent_articles = Some(mentioned);
    }
}
