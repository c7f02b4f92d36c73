use std::collections::BTreeSet;

use futures::future::join_all;
use log::warn;
use serde::Serialize;

use crate::database::{dedup_ids, ListDb, Removal};
use crate::error::AppError;
use crate::model::{Movie, MovieList};
use crate::movie_cache::{is_external_id, CacheError, MovieCache};

/// Result of adding a batch of ids to a list.
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct AddOutcome {
    /// Ids that were not in the list before.
    pub added: BTreeSet<String>,
    /// Ids the provider could not resolve.
    pub rejected: BTreeSet<String>,
}

fn list_not_found() -> AppError {
    AppError::NotFound("List not found".to_owned())
}

/// Keeps movie lists in sync with the movie cache. Another user's list is
/// reported as missing, never as forbidden.
#[derive(Clone)]
pub struct ListSync {
    db: sled::Db,
    cache: MovieCache,
}

impl ListSync {
    pub fn new(db: sled::Db, cache: MovieCache) -> Self {
        ListSync { db, cache }
    }

    pub fn create(
        &self,
        owner_id: u64,
        name: &str,
        movies: Vec<String>,
        public: bool,
    ) -> Result<MovieList, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("List name is required".to_owned()));
        }
        let malformed: Vec<&str> = movies
            .iter()
            .map(String::as_str)
            .filter(|id| !is_external_id(id))
            .collect();
        if !malformed.is_empty() {
            return Err(AppError::Validation(format!(
                "Invalid movie IDs: {}",
                malformed.join(", ")
            )));
        }
        self.db
            .create_list(owner_id, name, movies, public)?
            .ok_or_else(|| AppError::Conflict(format!("List already exists: {}", name)))
    }

    pub fn lists(&self, owner_id: u64) -> Result<Vec<MovieList>, AppError> {
        Ok(self.db.get_lists(owner_id)?)
    }

    fn list(&self, owner_id: u64, name: &str) -> Result<MovieList, AppError> {
        self.db.get_list(owner_id, name)?.ok_or_else(list_not_found)
    }

    /// Resolves every requested id and merges the resolvable ones into the
    /// list. Ids the provider does not know are reported back, not failed on.
    pub async fn add_movies(
        &self,
        owner_id: u64,
        name: &str,
        requested: Vec<String>,
    ) -> Result<AddOutcome, AppError> {
        let list = self.list(owner_id, name)?;
        let requested: BTreeSet<String> = requested.into_iter().collect();

        let mut outcome = AddOutcome::default();
        let mut candidates = Vec::new();
        for id in requested {
            if is_external_id(&id) {
                candidates.push(id);
            } else {
                outcome.rejected.insert(id);
            }
        }

        let resolved = join_all(candidates.iter().map(|id| self.cache.resolve(id))).await;
        let mut valid = Vec::new();
        for (id, result) in candidates.into_iter().zip(resolved) {
            match result {
                Ok(_) => valid.push(id),
                Err(CacheError::NotFound(_)) => {
                    outcome.rejected.insert(id);
                }
                Err(err) => return Err(err.into()),
            }
        }
        if !outcome.rejected.is_empty() {
            warn!(
                "rejected movie ids for list {:?}: {:?}",
                name, outcome.rejected
            );
        }

        outcome.added = valid
            .into_iter()
            .filter(|id| !list.movies.contains(id))
            .collect();
        if outcome.added.is_empty() {
            return Ok(outcome);
        }

        let merged = dedup_ids(list.movies.into_iter().chain(outcome.added.iter().cloned()));
        if !self.db.replace_movies(owner_id, name, merged)? {
            return Err(list_not_found());
        }
        Ok(outcome)
    }

    pub fn remove_movie(&self, owner_id: u64, name: &str, imdb_id: &str) -> Result<(), AppError> {
        match self.db.remove_movie(owner_id, name, imdb_id)? {
            Removal::Removed => Ok(()),
            Removal::NotMember => Err(AppError::NotFound(
                "Movie not found in the list".to_owned(),
            )),
            Removal::MissingList => Err(list_not_found()),
        }
    }

    pub fn delete(&self, owner_id: u64, name: &str) -> Result<(), AppError> {
        if self.db.delete_list(owner_id, name)? {
            Ok(())
        } else {
            Err(list_not_found())
        }
    }

    /// The list's movies in list order. Ids that cannot be resolved are
    /// left out rather than failing the read.
    pub async fn movies(&self, owner_id: u64, name: &str) -> Result<Vec<Movie>, AppError> {
        let list = self.list(owner_id, name)?;
        let (ids, malformed): (Vec<_>, Vec<_>) =
            list.movies.iter().partition(|id| is_external_id(id));
        if !malformed.is_empty() {
            warn!("invalid movie ids in list {:?}: {:?}", name, malformed);
        }

        let resolved = join_all(ids.iter().map(|id| self.cache.resolve(id))).await;
        Ok(ids
            .into_iter()
            .zip(resolved)
            .filter_map(|(id, result)| match result {
                Ok(movie) => Some(movie),
                Err(err) => {
                    warn!("skipping movie {} in list {:?}: {}", id, name, err);
                    None
                }
            })
            .collect())
    }
}
