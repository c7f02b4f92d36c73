use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::Movie;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A title as returned by a direct OMDb lookup.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Title {
    #[serde(rename = "imdbID", default)]
    pub imdb_id: Option<String>,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Rated", default)]
    pub rated: Option<String>,
    #[serde(rename = "Released", default)]
    pub released: Option<String>,
    #[serde(rename = "Runtime", default)]
    pub runtime: Option<String>,
    #[serde(rename = "Genre", default)]
    pub genre: Option<String>,
    #[serde(rename = "Director", default)]
    pub director: Option<String>,
    #[serde(rename = "Writer", default)]
    pub writer: Option<String>,
    #[serde(rename = "Actors", default)]
    pub actors: Option<String>,
    #[serde(rename = "Plot", default)]
    pub plot: Option<String>,
    #[serde(rename = "Language", default)]
    pub language: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
    #[serde(rename = "Poster", default)]
    pub poster: Option<String>,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: Option<String>,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
}

impl Title {
    /// Normalizes the title into a cache entry stored under `imdb_id`.
    pub fn into_movie(self, imdb_id: &str) -> Movie {
        Movie {
            imdb_id: imdb_id.to_owned(),
            title: present(self.title).unwrap_or_default(),
            year: present(self.year),
            genre: present(self.genre),
            director: present(self.director),
            plot: present(self.plot),
            poster: present(self.poster),
        }
    }
}

/// OMDb uses "N/A" for unknown attributes.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "N/A")
}

/// One row of an OMDb title search.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(rename = "Poster", default)]
    pub poster: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SearchPage {
    #[serde(rename = "Search", default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub title: String,
    pub kind: Option<String>,
    pub year: Option<String>,
    pub plot: Option<String>,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<SearchHit>),
    /// The provider's explanation, e.g. "Movie not found!".
    NotFound(String),
}

#[async_trait]
pub trait MovieProvider: Send + Sync {
    /// Looks up a title by its external identifier.
    async fn lookup_id(&self, imdb_id: &str) -> Result<Option<Title>, ProviderError>;
    /// Looks up the single best match for an exact title.
    async fn lookup_title(&self, title: &str) -> Result<Option<Title>, ProviderError>;
    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, ProviderError>;
}

pub const DEFAULT_BASE_URL: &str = "https://www.omdbapi.com/";

/// OMDb answers misses with HTTP 200 and `"Response":"False"`, so "not
/// found" comes back as data and only transport or decoding failures are
/// errors.
#[derive(Debug, Clone)]
pub struct OmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OmdbClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(OmdbClient {
            client,
            api_key,
            base_url,
        })
    }

    /// Sends a query and splits the reply into a found body or the
    /// provider's "not found" message.
    async fn query<T: DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<Result<T, String>, ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        if body.get("Response").and_then(Value::as_str) == Some("False") {
            let message = body
                .get("Error")
                .and_then(Value::as_str)
                .unwrap_or("Not found")
                .to_owned();
            debug!("omdb miss for {:?}: {}", params, message);
            return Ok(Err(message));
        }
        Ok(Ok(serde_json::from_value(body)?))
    }
}

#[async_trait]
impl MovieProvider for OmdbClient {
    async fn lookup_id(&self, imdb_id: &str) -> Result<Option<Title>, ProviderError> {
        Ok(self.query(&[("i", imdb_id)]).await?.ok())
    }

    async fn lookup_title(&self, title: &str) -> Result<Option<Title>, ProviderError> {
        Ok(self.query(&[("t", title)]).await?.ok())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, ProviderError> {
        let page = query.page.to_string();
        let mut params = vec![("s", query.title.as_str()), ("page", page.as_str())];
        if let Some(kind) = &query.kind {
            params.push(("type", kind.as_str()));
        }
        if let Some(year) = &query.year {
            params.push(("y", year.as_str()));
        }
        if let Some(plot) = &query.plot {
            params.push(("plot", plot.as_str()));
        }
        Ok(match self.query::<SearchPage>(&params).await? {
            Ok(page) => SearchOutcome::Found(page.search),
            Err(message) => SearchOutcome::NotFound(message),
        })
    }
}
