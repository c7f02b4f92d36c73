use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

/// A named movie list, addressed by its owner and name.
///
/// `movies` holds external identifiers in insertion order and never
/// contains the same identifier twice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieList {
    pub id: u64,
    #[serde(rename = "userId")]
    pub owner_id: u64,
    pub name: String,
    pub movies: Vec<String>,
    pub public: bool,
}

/// Cached movie attributes, keyed by the provider's identifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    pub title: String,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub plot: Option<String>,
    pub poster: Option<String>,
}
