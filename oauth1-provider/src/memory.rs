//! In-memory store, for tests and single-process embedding.
//!
//! Each compound operation runs under a single write lock, which gives the
//! atomicity the store traits require.

use crate::error::{Error, Result};
use crate::model::{Consumer, NonceRecord, Resource, Token, TokenType};
use crate::store::{CredentialStore, ExchangeOutcome, NonceStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::StorageError("memory store lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    consumers: Arc<RwLock<HashMap<String, Consumer>>>,
    resources: Arc<RwLock<HashMap<String, Resource>>>,
    tokens: Arc<RwLock<HashMap<String, Token>>>,
    nonces: Arc<RwLock<HashSet<NonceRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a consumer
    pub fn insert_consumer(&self, consumer: Consumer) -> Result<()> {
        self.consumers
            .write()
            .map_err(poisoned)?
            .insert(consumer.key.clone(), consumer);
        Ok(())
    }

    /// Register or replace a resource
    pub fn insert_resource(&self, resource: Resource) -> Result<()> {
        self.resources
            .write()
            .map_err(poisoned)?
            .insert(resource.name.clone(), resource);
        Ok(())
    }

    /// Number of stored tokens, expired ones included
    pub fn token_count(&self) -> Result<usize> {
        Ok(self.tokens.read().map_err(poisoned)?.len())
    }

    pub fn nonce_count(&self) -> Result<usize> {
        Ok(self.nonces.read().map_err(poisoned)?.len())
    }

    fn live_token(&self, key: &str, token_type: TokenType) -> Result<Option<Token>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .read()
            .map_err(poisoned)?
            .get(key)
            .filter(|t| t.token_type == token_type && !t.is_expired(now))
            .cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_consumer(&self, key: &str) -> Result<Option<Consumer>> {
        Ok(self.consumers.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn get_resource(&self, name: &str) -> Result<Option<Resource>> {
        Ok(self.resources.read().map_err(poisoned)?.get(name).cloned())
    }

    async fn get_request_token(&self, key: &str) -> Result<Option<Token>> {
        self.live_token(key, TokenType::Request)
    }

    async fn get_access_token(&self, key: &str, consumer_key: &str) -> Result<Option<Token>> {
        Ok(self
            .live_token(key, TokenType::Access)?
            .filter(|t| t.consumer_key == consumer_key))
    }

    async fn insert_token(&self, token: &Token) -> Result<bool> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        if tokens.contains_key(&token.key) {
            return Ok(false);
        }
        tokens.insert(token.key.clone(), token.clone());
        Ok(true)
    }

    async fn authorize_request_token(
        &self,
        key: &str,
        user: &str,
        verifier: &str,
    ) -> Result<Option<Token>> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        let Some(token) = tokens.get_mut(key).filter(|t| {
            t.token_type == TokenType::Request && !t.is_approved && !t.is_expired(now)
        }) else {
            return Ok(None);
        };

        token.user = Some(user.to_string());
        token.verifier = Some(verifier.to_string());
        token.is_approved = true;
        Ok(Some(token.clone()))
    }

    async fn exchange_request_token(
        &self,
        request_key: &str,
        access_token: &Token,
    ) -> Result<ExchangeOutcome> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().map_err(poisoned)?;

        let exchangeable = tokens.get(request_key).is_some_and(|t| {
            t.token_type == TokenType::Request && t.is_approved && !t.is_expired(now)
        });
        if !exchangeable {
            return Ok(ExchangeOutcome::RequestTokenGone);
        }
        if tokens.contains_key(&access_token.key) {
            return Ok(ExchangeOutcome::KeyCollision);
        }

        tokens.remove(request_key);
        tokens.insert(access_token.key.clone(), access_token.clone());
        Ok(ExchangeOutcome::Exchanged)
    }

    async fn delete_token(&self, key: &str) -> Result<bool> {
        Ok(self.tokens.write().map_err(poisoned)?.remove(key).is_some())
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl NonceStore for MemoryStore {
    async fn check_nonce(
        &self,
        consumer_key: &str,
        token_key: Option<&str>,
        nonce: &str,
        timestamp: i64,
    ) -> Result<bool> {
        let record = NonceRecord {
            consumer_key: consumer_key.to_string(),
            token_key: token_key.unwrap_or_default().to_string(),
            nonce: nonce.to_string(),
            timestamp,
        };
        Ok(self.nonces.write().map_err(poisoned)?.insert(record))
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let cutoff = before.timestamp();
        let mut nonces = self.nonces.write().map_err(poisoned)?;
        let count = nonces.len();
        nonces.retain(|record| record.timestamp >= cutoff);
        Ok((count - nonces.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackValidator;
    use crate::model::ConsumerStatus;
    use chrono::Duration;

    fn consumer() -> Consumer {
        Consumer {
            key: "dpf43f3p2l4k3l03".into(),
            secret: "kd94hf93k423kf44".into(),
            name: "printer".into(),
            owner: "jane".into(),
            description: None,
            status: ConsumerStatus::Accepted,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn nonce_tuple_is_single_use() {
        let store = MemoryStore::new();
        assert!(store.check_nonce("c", None, "n", 10).await.unwrap());
        assert!(!store.check_nonce("c", None, "n", 10).await.unwrap());
        assert!(store.check_nonce("c", Some("t"), "n", 10).await.unwrap());
        assert!(store.check_nonce("c", None, "n", 11).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_drops_old_nonces() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.check_nonce("c", None, "old", now.timestamp() - 600).await.unwrap();
        store.check_nonce("c", None, "new", now.timestamp()).await.unwrap();

        let removed = store.cleanup_expired(now - Duration::seconds(300)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.nonce_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn request_tokens_are_not_access_tokens() {
        let store = MemoryStore::new();
        let callbacks = CallbackValidator::new(vec![], 2083);
        let token = store
            .create_request_token(&consumer(), "oob", None, &callbacks, None)
            .await
            .unwrap();

        assert!(store.get_request_token(&token.key).await.unwrap().is_some());
        assert!(
            store
                .get_access_token(&token.key, &token.consumer_key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn expired_tokens_are_absent_and_purged() {
        let store = MemoryStore::new();
        let callbacks = CallbackValidator::new(vec![], 2083);
        let token = store
            .create_request_token(&consumer(), "oob", None, &callbacks, Some(Duration::seconds(-1)))
            .await
            .unwrap();

        assert!(store.get_request_token(&token.key).await.unwrap().is_none());
        assert_eq!(store.purge_expired_tokens(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.token_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unapproved_tokens_cannot_be_exchanged() {
        let store = MemoryStore::new();
        let callbacks = CallbackValidator::new(vec![], 2083);
        let mut token = store
            .create_request_token(&consumer(), "oob", None, &callbacks, None)
            .await
            .unwrap();

        // Forge the flag locally; the stored token is still unapproved.
        token.is_approved = true;
        assert!(store.create_access_token(&token, None).await.unwrap().is_none());
        assert!(store.get_request_token(&token.key).await.unwrap().is_some());
    }
}
