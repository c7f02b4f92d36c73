use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::database::{DbError, MovieDb};
use crate::model::Movie;
use crate::omdb::{MovieProvider, ProviderError};

static EXTERNAL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d+$").unwrap());

/// Whether `id` has the shape of an IMDb title id, e.g. `tt0111161`.
pub fn is_external_id(id: &str) -> bool {
    EXTERNAL_ID.is_match(id)
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The provider does not know this id.
    #[error("movie not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Read-through cache of provider metadata. Entries are never refreshed.
#[derive(Clone)]
pub struct MovieCache {
    db: sled::Db,
    provider: Arc<dyn MovieProvider>,
}

impl MovieCache {
    pub fn new(db: sled::Db, provider: Arc<dyn MovieProvider>) -> Self {
        MovieCache { db, provider }
    }

    pub async fn resolve(&self, imdb_id: &str) -> Result<Movie, CacheError> {
        if let Some(movie) = self.db.get_movie(imdb_id)? {
            return Ok(movie);
        }
        debug!("cache miss for {}", imdb_id);
        let title = self
            .provider
            .lookup_id(imdb_id)
            .await?
            .ok_or_else(|| CacheError::NotFound(imdb_id.to_owned()))?;
        Ok(self.db.insert_movie(&title.into_movie(imdb_id))?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::omdb::{SearchOutcome, SearchQuery, SearchHit, Title};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;

    /// In-memory provider that knows a fixed set of titles and counts lookups.
    /// Lookups of ids marked as failing return a provider error.
    #[derive(Default)]
    pub struct FakeProvider {
        titles: HashMap<String, Title>,
        failing: HashSet<String>,
        pub lookups: AtomicUsize,
    }

    impl FakeProvider {
        pub fn with_titles(titles: &[(&str, &str)]) -> Self {
            FakeProvider {
                titles: titles
                    .iter()
                    .map(|(id, name)| {
                        let title = Title {
                            imdb_id: Some(id.to_string()),
                            title: Some(name.to_string()),
                            year: Some("1994".to_owned()),
                            kind: Some("movie".to_owned()),
                            ..Default::default()
                        };
                        (id.to_string(), title)
                    })
                    .collect(),
                ..Default::default()
            }
        }

        pub fn failing(mut self, ids: &[&str]) -> Self {
            self.failing = ids.iter().map(|id| id.to_string()).collect();
            self
        }
    }

    fn broken_response() -> ProviderError {
        ProviderError::Decode(serde_json::from_str::<serde_json::Value>("").unwrap_err())
    }

    #[async_trait]
    impl MovieProvider for FakeProvider {
        async fn lookup_id(&self, imdb_id: &str) -> Result<Option<Title>, ProviderError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(imdb_id) {
                return Err(broken_response());
            }
            Ok(self.titles.get(imdb_id).cloned())
        }

        async fn lookup_title(&self, title: &str) -> Result<Option<Title>, ProviderError> {
            Ok(self
                .titles
                .values()
                .find(|t| t.title.as_deref() == Some(title))
                .cloned())
        }

        async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, ProviderError> {
            let needle = query.title.to_lowercase();
            let hits: Vec<SearchHit> = self
                .titles
                .values()
                .filter(|t| {
                    t.title
                        .as_deref()
                        .map_or(false, |name| name.to_lowercase().contains(&needle))
                })
                .map(|t| SearchHit {
                    title: t.title.clone().unwrap_or_default(),
                    year: t.year.clone(),
                    imdb_id: t.imdb_id.clone().unwrap_or_default(),
                    kind: t.kind.clone(),
                    poster: None,
                })
                .collect();
            if hits.is_empty() {
                Ok(SearchOutcome::NotFound("Movie not found!".to_owned()))
            } else {
                Ok(SearchOutcome::Found(hits))
            }
        }
    }

    fn cache(provider: Arc<FakeProvider>) -> MovieCache {
        let db = sled::Config::new().temporary(true).open().unwrap();
        MovieCache::new(db, provider)
    }

    #[test]
    fn external_id_shape() {
        assert!(is_external_id("tt0111161"));
        assert!(!is_external_id("bogus123"));
        assert!(!is_external_id("tt"));
        assert!(!is_external_id("tt123x"));
        assert!(!is_external_id(" tt123"));
    }

    #[actix_rt::test]
    async fn resolve_reads_through_once() {
        let provider = Arc::new(FakeProvider::with_titles(&[(
            "tt0111161",
            "The Shawshank Redemption",
        )]));
        let cache = cache(provider.clone());

        let movie = cache.resolve("tt0111161").await.unwrap();
        assert_eq!(movie.title, "The Shawshank Redemption");
        assert_eq!(movie.imdb_id, "tt0111161");
        let again = cache.resolve("tt0111161").await.unwrap();
        assert_eq!(movie, again);
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    }

    #[actix_rt::test]
    async fn resolve_unknown_is_not_found() {
        let provider = Arc::new(FakeProvider::default());
        let cache = cache(provider.clone());
        assert!(matches!(
            cache.resolve("tt9999999").await,
            Err(CacheError::NotFound(id)) if id == "tt9999999"
        ));
        assert!(matches!(
            cache.resolve("tt9999999").await,
            Err(CacheError::NotFound(_))
        ));
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }

    #[actix_rt::test]
    async fn provider_errors_are_not_cached() {
        let provider = Arc::new(
            FakeProvider::with_titles(&[("tt0111161", "The Shawshank Redemption")])
                .failing(&["tt0111161"]),
        );
        let cache = cache(provider.clone());
        assert!(matches!(
            cache.resolve("tt0111161").await,
            Err(CacheError::Provider(ProviderError::Decode(_)))
        ));
        assert!(cache.resolve("tt0111161").await.is_err());
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }
}
