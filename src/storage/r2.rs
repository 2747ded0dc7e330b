use super::{
    is_pending_key, is_session_key, user_pending_key, user_session_key, user_two_factor_key,
    user_wallet_key, user_wallets_prefix, wallet_owner_key, PendingStateStore, SessionStore,
    StorageError,
};
use crate::config::Settings;
use crate::flow::{FlowKind, FlowState, PendingRecord, Session};
use crate::services::{TwoFactorRecord, TwoFactorStore, WalletDirectory, WalletRecord};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::Utc;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USERS_PREFIX: &str = "users/";

#[derive(Serialize, Deserialize)]
struct WalletOwner {
    user_id: i64,
}

/// R2-backed storage implementation
pub struct R2Storage {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        // Short TTL: sweeps and other processes may change objects behind us
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(10 * 60))
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body_bytes = serde_json::to_vec(data)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body_bytes.clone()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        // Cache only what the bucket actually holds
        self.cache
            .insert(key.to_string(), Arc::new(body_bytes))
            .await;
        Ok(())
    }

    /// Load raw bytes from R2 through the cache
    async fn load_bytes(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, StorageError> {
        if let Some(cached) = self.cache.get(key).await {
            return Ok(Some(cached));
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();
                let data = Arc::new(data.to_vec());
                self.cache.insert(key.to_string(), Arc::clone(&data)).await;
                Ok(Some(data))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.load_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete object from R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 deletion fails.
    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(key).await;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    /// Lists keys under `prefix` accepted by `filter`, with their last
    /// modification time in unix seconds
    async fn list_keys(
        &self,
        prefix: &str,
        filter: fn(&str) -> bool,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3List(e.to_string()))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                if filter(key) {
                    let modified = object.last_modified().map_or(0, |t| t.secs());
                    keys.push((key.to_string(), modified));
                }
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn sweep_prefix(
        &self,
        filter: fn(&str) -> bool,
        ttl: Duration,
    ) -> Result<usize, StorageError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(ttl_secs);
        let mut removed = 0;

        for (key, modified) in self.list_keys(USERS_PREFIX, filter).await? {
            if modified < cutoff {
                self.delete_object(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Check connection to R2 storage
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the bucket is unreachable.
    pub async fn check_connection(&self) -> Result<(), String> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }

    async fn wallet_owner(&self, wallet_id: i64) -> Result<Option<i64>, StorageError> {
        Ok(self
            .load_json::<WalletOwner>(&wallet_owner_key(wallet_id))
            .await?
            .map(|owner| owner.user_id))
    }
}

#[async_trait]
impl SessionStore for R2Storage {
    async fn load_session(&self, user_id: i64) -> Result<Option<Session>, StorageError> {
        self.load_json(&user_session_key(user_id)).await
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        self.save_json(&user_session_key(session.user_id), session)
            .await
    }

    async fn delete_session(&self, user_id: i64) -> Result<(), StorageError> {
        self.delete_object(&user_session_key(user_id)).await
    }

    async fn sweep_sessions(&self, ttl: Duration) -> Result<usize, StorageError> {
        self.sweep_prefix(is_session_key, ttl).await
    }
}

#[async_trait]
impl PendingStateStore for R2Storage {
    async fn set_pending(&self, user_id: i64, state: &FlowState) -> Result<(), StorageError> {
        let record = PendingRecord::new(user_id, state)?;
        self.save_json(&user_pending_key(user_id, state.kind()), &record)
            .await
    }

    async fn get_pending(
        &self,
        user_id: i64,
        kind: FlowKind,
    ) -> Result<Option<FlowState>, StorageError> {
        let key = user_pending_key(user_id, kind);
        let Some(bytes) = self.load_bytes(&key).await? else {
            return Ok(None);
        };

        serde_json::from_slice::<PendingRecord>(&bytes)
            .ok()
            .filter(|record| record.flow == kind)
            .and_then(|record| record.decode())
            .map(Some)
            .ok_or(StorageError::Corrupt(key))
    }

    async fn clear_pending(&self, user_id: i64, kind: FlowKind) -> Result<bool, StorageError> {
        let key = user_pending_key(user_id, kind);
        // S3 deletes are idempotent, so existence has to be checked first
        let existed = match self.load_bytes(&key).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                debug!(key, error = %e, "Pending lookup before clear failed");
                true
            }
        };
        self.delete_object(&key).await?;
        Ok(existed)
    }

    async fn sweep_pending(&self, ttl: Duration) -> Result<usize, StorageError> {
        self.sweep_prefix(is_pending_key, ttl).await
    }
}

#[async_trait]
impl WalletDirectory for R2Storage {
    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<WalletRecord>, StorageError> {
        let Some(user_id) = self.wallet_owner(wallet_id).await? else {
            return Ok(None);
        };
        self.load_json(&user_wallet_key(user_id, wallet_id)).await
    }

    async fn list_wallets(&self, user_id: i64) -> Result<Vec<WalletRecord>, StorageError> {
        let prefix = user_wallets_prefix(user_id);
        let mut wallets = Vec::new();

        for (key, _) in self.list_keys(&prefix, |k| k.ends_with(".json")).await? {
            match self.load_json::<WalletRecord>(&key).await {
                Ok(Some(wallet)) => wallets.push(wallet),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "Skipping unreadable wallet record"),
            }
        }
        wallets.sort_by_key(|w| w.id);
        Ok(wallets)
    }

    async fn update_label(&self, wallet_id: i64, label: &str) -> Result<bool, StorageError> {
        let Some(mut wallet) = self.get_wallet(wallet_id).await? else {
            return Ok(false);
        };
        wallet.label = Some(label.to_string());
        self.save_json(&user_wallet_key(wallet.user_id, wallet_id), &wallet)
            .await?;
        Ok(true)
    }

    async fn delete_wallet(&self, wallet_id: i64) -> Result<bool, StorageError> {
        let Some(user_id) = self.wallet_owner(wallet_id).await? else {
            return Ok(false);
        };
        self.delete_object(&user_wallet_key(user_id, wallet_id))
            .await?;
        self.delete_object(&wallet_owner_key(wallet_id)).await?;
        Ok(true)
    }
}

#[async_trait]
impl TwoFactorStore for R2Storage {
    async fn get_two_factor(&self, user_id: i64) -> Result<Option<TwoFactorRecord>, StorageError> {
        self.load_json(&user_two_factor_key(user_id)).await
    }

    async fn store_pending_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError> {
        let record = TwoFactorRecord {
            secret: secret.to_string(),
            enabled: false,
        };
        self.save_json(&user_two_factor_key(user_id), &record).await
    }

    async fn activate_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError> {
        let record = TwoFactorRecord {
            secret: secret.to_string(),
            enabled: true,
        };
        self.save_json(&user_two_factor_key(user_id), &record).await
    }

    async fn erase_secret(&self, user_id: i64) -> Result<(), StorageError> {
        self.delete_object(&user_two_factor_key(user_id)).await
    }

    async fn erase_pending_secret(&self, user_id: i64) -> Result<(), StorageError> {
        match self.get_two_factor(user_id).await? {
            Some(record) if !record.enabled => self.erase_secret(user_id).await,
            _ => Ok(()),
        }
    }
}
