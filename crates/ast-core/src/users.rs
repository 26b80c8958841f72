//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Operator accounts: registration, authentication, tokens."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_common::unix_timestamp;
use ast_store::{Record, RecordStore};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ControllerError, Result};

/// Hex-encoded SHA-256 digest of a password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Opaque bearer token for a login: SHA-256 over the username, the current
/// unix time, and a nonce.
pub fn issue_token(username: &str) -> String {
    let seed = format!("{username}{}{}", unix_timestamp(), Uuid::new_v4());
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// Operator account management over the users table, keyed by username.
/// Password hashes never leave this module: every returned record is
/// sanitised first.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl UserService {
    /// Service over the given users table.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Every account, passwords stripped.
    pub async fn list(&self) -> Result<Vec<Record>> {
        let mut users = self.store.scan(&self.table, None).await?;
        for user in &mut users {
            user.remove("password");
        }
        Ok(users)
    }

    /// One account by username, password stripped.
    pub async fn get(&self, username: &str) -> Result<Record> {
        let mut user = self
            .store
            .get(&self.table, username)
            .await?
            .ok_or_else(|| ControllerError::not_found("user", username))?;
        user.remove("password");
        Ok(user)
    }

    /// Create an account. Username and password must be strings; duplicates
    /// are rejected; the stored password is the hash, never the plaintext.
    pub async fn register(&self, mut payload: Record) -> Result<Record> {
        let username = match payload.get("username").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_owned(),
            _ => {
                return Err(ControllerError::Validation(
                    "username must be a non-empty string".to_owned(),
                ))
            }
        };
        let password = match payload.get("password").and_then(Value::as_str) {
            Some(password) if !password.is_empty() => password.to_owned(),
            _ => {
                return Err(ControllerError::Validation(
                    "password must be a non-empty string".to_owned(),
                ))
            }
        };
        if self.store.get(&self.table, &username).await?.is_some() {
            return Err(ControllerError::Conflict(format!(
                "user {username} already exists"
            )));
        }

        payload.insert("password".to_owned(), json!(hash_password(&password)));
        payload.insert("created_at".to_owned(), json!(unix_timestamp()));
        payload
            .entry("role".to_owned())
            .or_insert_with(|| json!("user"));

        self.store.put(&self.table, &username, payload.clone()).await?;
        info!(user = %username, "user registered");

        payload.remove("password");
        Ok(payload)
    }

    /// Check credentials; returns the sanitised account on success and
    /// `Unauthorized` for both unknown users and wrong passwords.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Record> {
        let user = match self.store.get(&self.table, username).await? {
            Some(user) => user,
            None => {
                warn!(user = %username, "login attempt for unknown user");
                return Err(ControllerError::Unauthorized);
            }
        };
        let stored = user.get("password").and_then(Value::as_str).unwrap_or("");
        if stored != hash_password(password) {
            warn!(user = %username, "login attempt with wrong password");
            return Err(ControllerError::Unauthorized);
        }
        let mut user = user;
        user.remove("password");
        Ok(user)
    }

    /// Partial update; a new password is hashed before storage and the
    /// username stays immutable.
    pub async fn update(&self, username: &str, mut fields: Record) -> Result<Record> {
        self.get(username).await?;
        if let Some(password) = fields.get("password").and_then(Value::as_str) {
            let hashed = hash_password(password);
            fields.insert("password".to_owned(), json!(hashed));
        }
        fields.remove("username");
        self.store.update(&self.table, username, fields).await?;
        self.get(username).await
    }

    /// Delete an account.
    pub async fn delete(&self, username: &str) -> Result<()> {
        self.get(username).await?;
        self.store.delete(&self.table, username).await?;
        info!(user = %username, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast_store::MemoryRecordStore;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryRecordStore::new()), "ast-users")
    }

    fn account(username: &str, password: &str) -> Record {
        let mut user = Record::new();
        user.insert("username".to_owned(), json!(username));
        user.insert("password".to_owned(), json!(password));
        user.insert("email".to_owned(), json!(format!("{username}@ast.example")));
        user
    }

    #[tokio::test]
    async fn register_hashes_and_strips_the_password() {
        let service = service();
        let user = service.register(account("dispatch", "hunter2")).await.unwrap();
        assert!(user.get("password").is_none());
        assert_eq!(user["role"], json!("user"));

        // The stored hash must verify, and never equal the plaintext.
        let authed = service.authenticate("dispatch", "hunter2").await.unwrap();
        assert_eq!(authed["username"], json!("dispatch"));
        assert!(authed.get("password").is_none());
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let service = service();
        service.register(account("dispatch", "hunter2")).await.unwrap();
        assert!(matches!(
            service.register(account("dispatch", "other")).await,
            Err(ControllerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn wrong_credentials_are_unauthorized() {
        let service = service();
        service.register(account("dispatch", "hunter2")).await.unwrap();
        assert!(matches!(
            service.authenticate("dispatch", "wrong").await,
            Err(ControllerError::Unauthorized)
        ));
        assert!(matches!(
            service.authenticate("nobody", "hunter2").await,
            Err(ControllerError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn password_update_rehashes() {
        let service = service();
        service.register(account("dispatch", "hunter2")).await.unwrap();
        let mut fields = Record::new();
        fields.insert("password".to_owned(), json!("correct-horse"));
        service.update("dispatch", fields).await.unwrap();

        assert!(service.authenticate("dispatch", "hunter2").await.is_err());
        assert!(service.authenticate("dispatch", "correct-horse").await.is_ok());
    }

    #[test]
    fn tokens_are_hex_and_unique() {
        let a = issue_token("dispatch");
        let b = issue_token("dispatch");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
