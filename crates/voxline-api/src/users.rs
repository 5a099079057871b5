use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use voxline_db::Database;
use voxline_db::models::UserRow;
use voxline_types::models::User;

use crate::blocking;
use crate::credentials::CredentialHasher;
use crate::error::AppError;

/// Registration, login and user lookups.
pub struct UserService {
    db: Arc<Database>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserService {
    pub fn new(db: Arc<Database>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { db, hasher }
    }

    /// Create an account. The password is stored only as a hash.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Err(AppError::Validation("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(AppError::Validation("password must not be empty".into()));
        }

        let db = self.db.clone();
        let name = username.clone();
        let taken = blocking(move || Ok(db.get_user_by_username(&name)?.is_some())).await?;
        if taken {
            return Err(AppError::Duplicate(format!("username '{}' is taken", username)));
        }

        let db = self.db.clone();
        let hasher = self.hasher.clone();
        let password = password.to_string();
        // The UNIQUE constraint still catches a concurrent registration
        let row = blocking(move || {
            let hash = hasher.hash(&password)?;
            Ok(db.create_user(&username, &hash)?)
        })
        .await?;

        info!("Registered user {} ({})", row.username, row.id);
        Ok(user_from_row(row))
    }

    /// The user with these credentials, if any.
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Result<Option<User>, AppError> {
        let db = self.db.clone();
        let hasher = self.hasher.clone();
        let username = normalize_username(username);
        let password = password.to_string();

        blocking(move || {
            let Some(row) = db.get_user_by_username(&username)? else {
                return Ok(None);
            };
            if hasher.verify(&password, &row.password) {
                Ok(Some(user_from_row(row)))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let db = self.db.clone();
        blocking(move || Ok(db.get_user_by_id(id)?.map(user_from_row))).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let db = self.db.clone();
        let username = normalize_username(username);
        blocking(move || Ok(db.get_user_by_username(&username)?.map(user_from_row))).await
    }

    pub async fn list_all(&self) -> Result<Vec<User>, AppError> {
        let db = self.db.clone();
        blocking(move || Ok(db.list_users()?.into_iter().map(user_from_row).collect())).await
    }
}

/// Usernames are compared without surrounding whitespace on every path.
fn normalize_username(username: &str) -> String {
    username.trim().to_string()
}

pub(crate) fn user_from_row(row: UserRow) -> User {
    let created_at = parse_timestamp(&row.created_at).unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on user {}: {}", row.created_at, row.id, e);
        DateTime::default()
    });

    User {
        id: row.id,
        username: row.username,
        created_at,
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Argon2Hasher;
    use argon2::Params;

    fn service() -> UserService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hasher = Argon2Hasher::with_params(Params::new(Params::MIN_M_COST, 1, 1, None).unwrap());
        UserService::new(db, Arc::new(hasher))
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let users = service();
        let alice = users.register("alice", "pw-alice").await.unwrap();

        assert_eq!(alice.username, "alice");
        assert_eq!(users.get_by_id(alice.id).await.unwrap(), Some(alice.clone()));
        assert_eq!(users.get_by_username("alice").await.unwrap(), Some(alice));
        assert_eq!(users.get_by_username("bob").await.unwrap(), None);
        assert_eq!(users.get_by_id(9999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_username_fails_second_time() {
        let users = service();
        users.register("alice", "first").await.unwrap();

        let err = users.register("alice", "second").await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));

        // First registration's credentials still work
        assert!(users.validate_credentials("alice", "first").await.unwrap().is_some());
        assert!(users.validate_credentials("alice", "second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let users = service();
        assert!(matches!(
            users.register("   ", "pw").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            users.register("alice", "").await,
            Err(AppError::Validation(_))
        ));
        assert!(users.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn password_is_not_stored_in_plaintext() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hasher = Argon2Hasher::with_params(Params::new(Params::MIN_M_COST, 1, 1, None).unwrap());
        let users = UserService::new(db.clone(), Arc::new(hasher));

        users.register("alice", "hunter22").await.unwrap();
        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_ne!(row.password, "hunter22");
        assert!(row.password.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn credentials_check() {
        let users = service();
        let alice = users.register("alice", "pw-alice").await.unwrap();

        let found = users.validate_credentials("alice", "pw-alice").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(alice.id));
        assert!(users.validate_credentials("alice", "nope").await.unwrap().is_none());
        assert!(users.validate_credentials("nobody", "pw-alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn padded_username_matches_on_every_path() {
        let users = service();
        let alice = users.register(" alice ", "pw").await.unwrap();
        assert_eq!(alice.username, "alice");

        for name in [" alice ", "alice"] {
            let found = users.validate_credentials(name, "pw").await.unwrap();
            assert_eq!(found.map(|u| u.id), Some(alice.id), "{name:?}");
            assert_eq!(users.get_by_username(name).await.unwrap(), Some(alice.clone()));
        }
    }

    #[tokio::test]
    async fn list_all_returns_every_user() {
        let users = service();
        for name in ["alice", "bob", "carol"] {
            users.register(name, "pw").await.unwrap();
        }

        let names: Vec<String> = users
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
