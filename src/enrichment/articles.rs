//! Short-lived cache for the indicator-agnostic article feed

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::models::Article;

/// How long a fetched article feed is reused
pub const ARTICLE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct ArticleCache {
    cache: Cache<(), Arc<Vec<Article>>>,
}

impl ArticleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    pub async fn get(&self) -> Option<Arc<Vec<Article>>> {
        self.cache.get(&()).await
    }

    pub async fn store(&self, articles: Arc<Vec<Article>>) {
        self.cache.insert((), articles).await;
    }
}

impl Default for ArticleCache {
    fn default() -> Self {
        Self::new(ARTICLE_CACHE_TTL)
    }
}

impl std::fmt::Debug for ArticleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArticleCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles(guid: &str) -> Arc<Vec<Article>> {
        Arc::new(vec![Article {
            guid: Some(guid.to_string()),
            ..Article::default()
        }])
    }

    #[tokio::test]
    async fn test_store_replaces_previous_feed() {
        let cache = ArticleCache::default();
        assert!(cache.get().await.is_none());

        cache.store(articles("a1")).await;
        cache.store(articles("a2")).await;

        let cached = cache.get().await.unwrap();
        assert_eq!(cached[0].guid.as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ArticleCache::new(Duration::from_millis(50));
        cache.store(articles("a1")).await;
        assert!(cache.get().await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get().await.is_none());
    }
}
