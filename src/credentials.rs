use once_cell::sync::OnceCell;

use crate::database::UserDb;
use crate::error::AppError;
use crate::model::User;

pub const DEFAULT_COST: u32 = 10;

/// Usernames and bcrypt password hashes. Plaintext passwords are never
/// stored or logged.
#[derive(Clone)]
pub struct CredentialStore {
    db: sled::Db,
    cost: u32,
    /// Verified against when the username is unknown, so both failures cost
    /// one bcrypt round.
    dummy_hash: OnceCell<String>,
}

fn hashing_failed(err: bcrypt::BcryptError) -> AppError {
    AppError::Internal(format!("password hashing failed: {}", err))
}

impl CredentialStore {
    pub fn new(db: sled::Db, cost: u32) -> Self {
        CredentialStore {
            db,
            cost,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn create(&self, username: &str, password: &str) -> Result<(u64, User), AppError> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Username and password are required".to_owned(),
            ));
        }
        let user = User {
            username: username.to_owned(),
            password_hash: bcrypt::hash(password, self.cost).map_err(hashing_failed)?,
        };
        let id = self
            .db
            .add_user(&user)?
            .ok_or_else(|| AppError::Conflict("Username already exists".to_owned()))?;
        Ok((id, user))
    }

    /// Unknown usernames and wrong passwords fail the same way.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(u64, User), AppError> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Username and password are required".to_owned(),
            ));
        }
        let (id, user) = match self.db.get_user_by_username(username)? {
            Some(found) => found,
            None => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| bcrypt::hash("not a password", self.cost))
                    .map_err(hashing_failed)?;
                let _ = bcrypt::verify(password, dummy);
                return Err(AppError::InvalidCredentials);
            }
        };
        let matches = bcrypt::verify(password, &user.password_hash)
            .map_err(|err| AppError::Internal(format!("password verification failed: {}", err)))?;
        if matches {
            Ok((id, user))
        } else {
            Err(AppError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        CredentialStore::new(db, 4)
    }

    #[test]
    fn signup_twice_conflicts() {
        let store = store();
        let (_, user) = store.create("alice", "pw123").unwrap();
        assert_ne!(user.password_hash, "pw123");
        assert!(matches!(
            store.create("alice", "other"),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let store = store();
        assert!(matches!(store.create("", "pw"), Err(AppError::Validation(_))));
        assert!(matches!(store.create("bob", ""), Err(AppError::Validation(_))));
        assert!(matches!(
            store.authenticate("bob", ""),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn authenticate_hides_failure_cause() {
        let store = store();
        let (id, _) = store.create("alice", "pw123").unwrap();
        assert_eq!(store.authenticate("alice", "pw123").unwrap().0, id);
        assert!(matches!(
            store.authenticate("alice", "wrong"),
            Err(AppError::InvalidCredentials)
        ));
        assert!(store.dummy_hash.get().is_none());
        assert!(matches!(
            store.authenticate("mallory", "pw123"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn unknown_user_still_runs_bcrypt() {
        let store = store();
        assert!(matches!(
            store.authenticate("mallory", "pw123"),
            Err(AppError::InvalidCredentials)
        ));
        let dummy = store.dummy_hash.get().unwrap().clone();
        assert!(dummy.starts_with("$2"));
        assert!(!bcrypt::verify("pw123", &dummy).unwrap());

        assert!(store.authenticate("mallory", "other").is_err());
        assert_eq!(store.dummy_hash.get(), Some(&dummy));
    }
}
