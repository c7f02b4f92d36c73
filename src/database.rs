use crate::model::*;
use sled::transaction::{TransactionError, Transactional};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("bad index {0}")]
    Index(&'static str),
}

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64, DbError> {
    id.as_ref()
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(|_| DbError::Index("malformed id"))
}

/// Lists are keyed by owner id followed by the list name, so a prefix scan
/// over the owner id yields exactly that owner's lists.
fn list_key(owner_id: u64, name: &str) -> Vec<u8> {
    let mut key = serialize_id(owner_id).to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

/// Drops repeated ids, keeping the first occurrence of each.
pub fn dedup_ids<I: IntoIterator<Item = String>>(ids: I) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub trait UserDb {
    type Error;
    fn add_user(&self, user: &User) -> Result<Option<u64>, Self::Error>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<(u64, User)>, Self::Error>;
}

const USERS: &[u8] = b"users";
const USERS_USERNAME: &[u8] = b"USERS_USERNAME";

impl UserDb for sled::Db {
    type Error = DbError;

    /// Returns `None` if the username is taken.
    fn add_user(&self, user: &User) -> Result<Option<u64>, DbError> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let id = self.generate_id()?;
        let encoded = bincode::serialize(user)?;
        let result = (&users, &users_username).transaction(|(users, users_username)| {
            if users_username
                .insert(user.username.as_bytes(), &serialize_id(id)[..])?
                .is_some()
            {
                return sled::transaction::abort(());
            }
            users.insert(&serialize_id(id)[..], encoded.as_slice())?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(Some(id)),
            Err(TransactionError::Abort(())) => Ok(None),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<(u64, User)>, DbError> {
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users = self.open_tree(USERS)?;
        if let Some(id) = users_username.get(username)? {
            let data = users
                .get(&id)?
                .ok_or(DbError::Index("users_username"))?;
            Ok(Some((deserialize_id(&id)?, bincode::deserialize(&data)?)))
        } else {
            Ok(None)
        }
    }
}

pub trait MovieDb {
    type Error;
    fn get_movie(&self, imdb_id: &str) -> Result<Option<Movie>, Self::Error>;
    fn insert_movie(&self, movie: &Movie) -> Result<Movie, Self::Error>;
}

const MOVIES: &[u8] = b"movies";

impl MovieDb for sled::Db {
    type Error = DbError;

    fn get_movie(&self, imdb_id: &str) -> Result<Option<Movie>, DbError> {
        let movies = self.open_tree(MOVIES)?;
        Ok(match movies.get(imdb_id)? {
            Some(data) => Some(bincode::deserialize(&data)?),
            None => None,
        })
    }

    /// Stores `movie` unless an entry with the same id exists. Returns the
    /// entry that ends up persisted.
    fn insert_movie(&self, movie: &Movie) -> Result<Movie, DbError> {
        let movies = self.open_tree(MOVIES)?;
        let encoded = bincode::serialize(movie)?;
        match movies.compare_and_swap(
            movie.imdb_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encoded),
        )? {
            Ok(()) => Ok(movie.clone()),
            Err(conflict) => match conflict.current {
                Some(existing) => Ok(bincode::deserialize(&existing)?),
                None => Ok(movie.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    NotMember,
    MissingList,
}

pub trait ListDb {
    type Error;
    fn create_list(
        &self,
        owner_id: u64,
        name: &str,
        movies: Vec<String>,
        public: bool,
    ) -> Result<Option<MovieList>, Self::Error>;
    fn get_lists(&self, owner_id: u64) -> Result<Vec<MovieList>, Self::Error>;
    fn get_list(&self, owner_id: u64, name: &str) -> Result<Option<MovieList>, Self::Error>;
    fn replace_movies(
        &self,
        owner_id: u64,
        name: &str,
        movies: Vec<String>,
    ) -> Result<bool, Self::Error>;
    fn remove_movie(&self, owner_id: u64, name: &str, imdb_id: &str)
        -> Result<Removal, Self::Error>;
    fn delete_list(&self, owner_id: u64, name: &str) -> Result<bool, Self::Error>;
}

const LISTS: &[u8] = b"lists";

impl ListDb for sled::Db {
    type Error = DbError;

    /// Returns `None` if the owner already has a list with this name.
    fn create_list(
        &self,
        owner_id: u64,
        name: &str,
        movies: Vec<String>,
        public: bool,
    ) -> Result<Option<MovieList>, DbError> {
        let lists = self.open_tree(LISTS)?;
        let list = MovieList {
            id: self.generate_id()?,
            owner_id,
            name: name.to_owned(),
            movies: dedup_ids(movies),
            public,
        };
        let encoded = bincode::serialize(&list)?;
        match lists.compare_and_swap(list_key(owner_id, name), None as Option<&[u8]>, Some(encoded))? {
            Ok(()) => Ok(Some(list)),
            Err(_) => Ok(None),
        }
    }

    fn get_lists(&self, owner_id: u64) -> Result<Vec<MovieList>, DbError> {
        let lists = self.open_tree(LISTS)?;
        lists
            .scan_prefix(serialize_id(owner_id))
            .map(|entry| -> Result<MovieList, DbError> {
                let (_key, data) = entry?;
                Ok(bincode::deserialize(&data)?)
            })
            .collect()
    }

    fn get_list(&self, owner_id: u64, name: &str) -> Result<Option<MovieList>, DbError> {
        let lists = self.open_tree(LISTS)?;
        Ok(match lists.get(list_key(owner_id, name))? {
            Some(data) => Some(bincode::deserialize(&data)?),
            None => None,
        })
    }

    /// Returns `false` if the list does not exist.
    fn replace_movies(&self, owner_id: u64, name: &str, movies: Vec<String>) -> Result<bool, DbError> {
        let lists = self.open_tree(LISTS)?;
        let key = list_key(owner_id, name);
        let mut list: MovieList = match lists.get(&key)? {
            Some(data) => bincode::deserialize(&data)?,
            None => return Ok(false),
        };
        list.movies = dedup_ids(movies);
        lists.insert(key, bincode::serialize(&list)?)?;
        Ok(true)
    }

    fn remove_movie(&self, owner_id: u64, name: &str, imdb_id: &str) -> Result<Removal, DbError> {
        let lists = self.open_tree(LISTS)?;
        let key = list_key(owner_id, name);
        let mut list: MovieList = match lists.get(&key)? {
            Some(data) => bincode::deserialize(&data)?,
            None => return Ok(Removal::MissingList),
        };
        if !list.movies.iter().any(|id| id == imdb_id) {
            return Ok(Removal::NotMember);
        }
        list.movies.retain(|id| id != imdb_id);
        lists.insert(key, bincode::serialize(&list)?)?;
        Ok(Removal::Removed)
    }

    fn delete_list(&self, owner_id: u64, name: &str) -> Result<bool, DbError> {
        let lists = self.open_tree(LISTS)?;
        Ok(lists.remove(list_key(owner_id, name))?.is_some())
    }
}
