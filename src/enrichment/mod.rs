//! PassiveTotal enrichment orchestration
//!
//! [`Enricher`] owns every piece of state that outlives a single call: the
//! request scheduler, the memoized blocklist regexes and the article cache.
//! Build one per process and share it between requests.

pub mod articles;
pub mod details;
pub mod limits;
pub mod lookup;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::filter::BlocklistRegexes;
use crate::gateway::{ApiRequest, Credentials, GatewayError, VendorApi, endpoints, fetch};
use crate::models::Article;
use crate::models::Options;
use crate::models::vendor::{ArticleList, ResultsPage};
use crate::scheduler::{Scheduler, SchedulerSettings};

pub use articles::{ARTICLE_CACHE_TTL, ArticleCache};
pub use limits::{LimitCounters, SearchFailure, gateway_limit, reached_search_limit};

pub struct Enricher {
    api: Arc<dyn VendorApi>,
    scheduler: OnceLock<Scheduler>,
    blocklists: Mutex<BlocklistRegexes>,
    articles: ArticleCache,
}

impl Enricher {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self::with_article_ttl(api, ARTICLE_CACHE_TTL)
    }

    pub fn with_article_ttl(api: Arc<dyn VendorApi>, ttl: Duration) -> Self {
        Self {
            api,
            scheduler: OnceLock::new(),
            blocklists: Mutex::new(BlocklistRegexes::new()),
            articles: ArticleCache::new(ttl),
        }
    }

    /// The process-wide scheduler, built from the first options seen.
    ///
    /// Later changes to `maxConcurrent` or `minTime` only take effect after a
    /// restart.
    pub fn scheduler(&self, options: &Options) -> &Scheduler {
        let requested = SchedulerSettings::from_options(options);
        let scheduler = self.scheduler.get_or_init(|| {
            tracing::info!(
                max_concurrent = requested.max_concurrent,
                min_time_ms = requested.min_time.as_millis() as u64,
                "Creating request scheduler"
            );
            Scheduler::new(requested)
        });

        if scheduler.settings() != requested {
            tracing::debug!(
                active = ?scheduler.settings(),
                requested = ?requested,
                "Scheduler settings changed; restart to apply them"
            );
        }

        scheduler
    }

    fn blocklists(&self) -> MutexGuard<'_, BlocklistRegexes> {
        self.blocklists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The recent article feed, from cache when fresh
    async fn recent_articles(
        &self,
        scheduler: &Scheduler,
        credentials: &Credentials,
    ) -> Result<Arc<Vec<Article>>, SearchFailure> {
        if let Some(cached) = self.articles.get().await {
            tracing::debug!(articles = cached.len(), "Using cached article feed");
            return Ok(cached);
        }

        let list: Option<ArticleList> = scheduler
            .submit(fetch(
                self.api.as_ref(),
                credentials,
                ApiRequest::new(endpoints::ARTICLES),
            ))
            .await??;

        let articles = Arc::new(list.map(|list| list.articles).unwrap_or_default());
        self.articles.store(articles.clone()).await;
        Ok(articles)
    }

    /// Host pairs in both directions, each capped at `records`, deduplicated
    async fn host_pairs(
        &self,
        credentials: &Credentials,
        query: &str,
        records: usize,
    ) -> Result<Vec<Value>, GatewayError> {
        let direction = |side: &'static str| {
            fetch::<ResultsPage<Value>>(
                self.api.as_ref(),
                credentials,
                ApiRequest::new(endpoints::HOST_PAIRS)
                    .query("query", query)
                    .query("direction", side),
            )
        };

        let (parents, children) =
            futures::try_join!(direction("parents"), direction("children"))?;

        let mut pairs: Vec<Value> = vec![];
        for pair in [parents, children]
            .into_iter()
            .flat_map(|page| page.unwrap_or_default().results.into_iter().take(records))
        {
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }

        Ok(pairs)
    }

    /// A raw vendor body; "no result" becomes `null`
    async fn raw(&self, credentials: &Credentials, request: ApiRequest) -> Result<Value, GatewayError> {
        Ok(self
            .api
            .get(credentials, request)
            .await?
            .unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("scheduler", &self.scheduler.get())
            .field("articles", &self.articles)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::Value;

    use crate::gateway::{ApiRequest, GatewayError, MockVendorApi};

    pub fn options() -> crate::models::Options {
        crate::models::Options {
            host: "https://api.passivetotal.org".to_string(),
            user: "test".to_string(),
            api_key: "12345".to_string(),
            ..crate::models::Options::default()
        }
    }

    /// A mock answering by path with `route`
    pub fn mock_api<F>(route: F) -> MockVendorApi
    where
        F: Fn(&ApiRequest) -> Result<Option<Value>, GatewayError> + Send + 'static,
    {
        let mut api = MockVendorApi::new();
        api.expect_get()
            .returning(move |_, request| route(&request));
        api
    }
}
