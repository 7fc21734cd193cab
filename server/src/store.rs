use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use oauth1_provider::{
    Consumer, CredentialStore, ExchangeOutcome, NonceStore, Resource, Token, TokenType,
    error::{Error, Result},
};
use sqlx::{Row, Sqlite, SqlitePool, sqlite::SqliteRow};

const TOKEN_COLUMNS: &str = r#"
    t.key, t.secret, t.token_type, t.consumer_key, t.user_id, t.resource,
    t.callback, t.callback_confirmed, t.verifier, t.is_approved,
    t.created_at, t.expires_at,
    r.url AS resource_url, r.is_readonly AS resource_readonly
"#;

fn storage(e: sqlx::Error) -> Error {
    Error::StorageError(e.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::StorageError(format!("invalid timestamp {:?}: {}", value, e)))
}

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert or update a consumer
    pub async fn upsert_consumer(&self, consumer: &Consumer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_consumers (key, secret, name, owner, description, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                secret = excluded.secret,
                name = excluded.name,
                owner = excluded.owner,
                description = excluded.description,
                status = excluded.status
            "#,
        )
        .bind(&consumer.key)
        .bind(&consumer.secret)
        .bind(&consumer.name)
        .bind(&consumer.owner)
        .bind(&consumer.description)
        .bind(consumer.status.as_str())
        .bind(timestamp(consumer.created_at))
        .execute(&self.db)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Insert or update a resource
    pub async fn upsert_resource(&self, resource: &Resource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_resources (name, url, is_readonly)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                is_readonly = excluded.is_readonly
            "#,
        )
        .bind(&resource.name)
        .bind(&resource.url)
        .bind(resource.is_readonly)
        .execute(&self.db)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn fetch_token(&self, key: &str, token_type: TokenType) -> Result<Option<Token>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM oauth_tokens t
            LEFT JOIN oauth_resources r ON r.name = t.resource
            WHERE t.key = ? AND t.token_type = ?
              AND (t.expires_at IS NULL OR t.expires_at > ?)
            "#,
            TOKEN_COLUMNS
        ))
        .bind(key)
        .bind(token_type.as_str())
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.db)
        .await
        .map_err(storage)?;

        row.as_ref().map(token_from_row).transpose()
    }
}

fn token_from_row(row: &SqliteRow) -> Result<Token> {
    let token_type: String = row.try_get("token_type").map_err(storage)?;
    let token_type = token_type.parse::<TokenType>().map_err(Error::StorageError)?;

    let resource = match row.try_get::<Option<String>, _>("resource").map_err(storage)? {
        Some(name) => Some(Resource {
            name,
            url: row.try_get("resource_url").map_err(storage)?,
            is_readonly: row.try_get("resource_readonly").map_err(storage)?,
        }),
        None => None,
    };

    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let expires_at: Option<String> = row.try_get("expires_at").map_err(storage)?;

    Ok(Token {
        key: row.try_get("key").map_err(storage)?,
        secret: row.try_get("secret").map_err(storage)?,
        token_type,
        consumer_key: row.try_get("consumer_key").map_err(storage)?,
        user: row.try_get("user_id").map_err(storage)?,
        resource,
        callback: row.try_get("callback").map_err(storage)?,
        callback_confirmed: row.try_get("callback_confirmed").map_err(storage)?,
        verifier: row.try_get("verifier").map_err(storage)?,
        is_approved: row.try_get("is_approved").map_err(storage)?,
        created_at: parse_timestamp(&created_at)?,
        expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

async fn insert_token_row<'e, E>(executor: E, token: &Token) -> std::result::Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO oauth_tokens (
            key, secret, token_type, consumer_key, user_id, resource, callback,
            callback_confirmed, verifier, is_approved, created_at, expires_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&token.key)
    .bind(&token.secret)
    .bind(token.token_type.as_str())
    .bind(&token.consumer_key)
    .bind(&token.user)
    .bind(token.scope_name())
    .bind(&token.callback)
    .bind(token.callback_confirmed)
    .bind(&token.verifier)
    .bind(token.is_approved)
    .bind(timestamp(token.created_at))
    .bind(token.expires_at.map(timestamp))
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_consumer(&self, key: &str) -> Result<Option<Consumer>> {
        let row = sqlx::query(
            r#"
            SELECT key, secret, name, owner, description, status, created_at
            FROM oauth_consumers
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .map_err(storage)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status").map_err(storage)?;
        let created_at: String = row.try_get("created_at").map_err(storage)?;
        Ok(Some(Consumer {
            key: row.try_get("key").map_err(storage)?,
            secret: row.try_get("secret").map_err(storage)?,
            name: row.try_get("name").map_err(storage)?,
            owner: row.try_get("owner").map_err(storage)?,
            description: row.try_get("description").map_err(storage)?,
            status: status.parse().map_err(Error::StorageError)?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    async fn get_resource(&self, name: &str) -> Result<Option<Resource>> {
        let row = sqlx::query("SELECT name, url, is_readonly FROM oauth_resources WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db)
            .await
            .map_err(storage)?;

        row.map(|row| {
            Ok(Resource {
                name: row.try_get("name").map_err(storage)?,
                url: row.try_get("url").map_err(storage)?,
                is_readonly: row.try_get("is_readonly").map_err(storage)?,
            })
        })
        .transpose()
    }

    async fn get_request_token(&self, key: &str) -> Result<Option<Token>> {
        self.fetch_token(key, TokenType::Request).await
    }

    async fn get_access_token(&self, key: &str, consumer_key: &str) -> Result<Option<Token>> {
        Ok(self
            .fetch_token(key, TokenType::Access)
            .await?
            .filter(|t| t.consumer_key == consumer_key))
    }

    async fn insert_token(&self, token: &Token) -> Result<bool> {
        match insert_token_row(&self.db, token).await {
            Ok(()) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(storage(e)),
        }
    }

    async fn authorize_request_token(
        &self,
        key: &str,
        user: &str,
        verifier: &str,
    ) -> Result<Option<Token>> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_tokens
            SET user_id = ?, verifier = ?, is_approved = 1
            WHERE key = ? AND token_type = 'request' AND is_approved = 0
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(user)
        .bind(verifier)
        .bind(key)
        .bind(timestamp(Utc::now()))
        .execute(&self.db)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_request_token(key).await
    }

    async fn exchange_request_token(
        &self,
        request_key: &str,
        access_token: &Token,
    ) -> Result<ExchangeOutcome> {
        let mut tx = self.db.begin().await.map_err(storage)?;

        // The conditional delete picks the winner among concurrent exchanges
        let deleted = sqlx::query(
            r#"
            DELETE FROM oauth_tokens
            WHERE key = ? AND token_type = 'request' AND is_approved = 1
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(request_key)
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await.map_err(storage)?;
            return Ok(ExchangeOutcome::RequestTokenGone);
        }

        match insert_token_row(&mut *tx, access_token).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await.map_err(storage)?;
                return Ok(ExchangeOutcome::KeyCollision);
            }
            Err(e) => return Err(storage(e)),
        }

        tx.commit().await.map_err(storage)?;
        Ok(ExchangeOutcome::Exchanged)
    }

    async fn delete_token(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM oauth_tokens WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(timestamp(now))
        .execute(&self.db)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NonceStore for SqliteStore {
    async fn check_nonce(
        &self,
        consumer_key: &str,
        token_key: Option<&str>,
        nonce: &str,
        timestamp: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO oauth_nonces (consumer_key, token_key, nonce, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(consumer_key)
        .bind(token_key.unwrap_or_default())
        .bind(nonce)
        .bind(timestamp)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(storage(e)),
        }
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oauth_nonces WHERE timestamp < ?")
            .bind(before.timestamp())
            .execute(&self.db)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }
}
