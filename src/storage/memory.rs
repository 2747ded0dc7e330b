use super::{user_pending_key, PendingStateStore, SessionStore, StorageError};
use crate::flow::{FlowKind, FlowState, PendingRecord, Session};
use crate::services::{TwoFactorRecord, TwoFactorStore, WalletDirectory, WalletRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Storage kept in process memory
///
/// Used by tests and for running the bot without a bucket. Pending records
/// keep their raw envelope so corrupt payloads behave as they would in R2.
#[derive(Default)]
pub struct MemoryStorage {
    sessions: RwLock<HashMap<i64, Session>>,
    pending: RwLock<HashMap<(i64, FlowKind), PendingRecord>>,
    wallets: RwLock<HashMap<i64, WalletRecord>>,
    two_factor: RwLock<HashMap<i64, TwoFactorRecord>>,
}

impl MemoryStorage {
    /// Empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a wallet record
    pub async fn insert_wallet(&self, wallet: WalletRecord) {
        self.wallets.write().await.insert(wallet.id, wallet);
    }

    /// Add or replace a two-factor record
    pub async fn insert_two_factor(&self, user_id: i64, record: TwoFactorRecord) {
        self.two_factor.write().await.insert(user_id, record);
    }

    /// Store a snapshot with an explicit write time
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub async fn insert_pending_at(
        &self,
        user_id: i64,
        state: &FlowState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut record = PendingRecord::new(user_id, state)?;
        record.updated_at = updated_at;
        self.pending
            .write()
            .await
            .insert((user_id, state.kind()), record);
        Ok(())
    }

    /// Store an arbitrary payload under (user, kind)
    pub async fn insert_raw_pending(&self, user_id: i64, kind: FlowKind, payload: serde_json::Value) {
        self.pending.write().await.insert(
            (user_id, kind),
            PendingRecord {
                user_id,
                flow: kind,
                payload,
                updated_at: Utc::now(),
            },
        );
    }

    /// Kinds with a stored snapshot for a user, in priority order
    pub async fn pending_kinds(&self, user_id: i64) -> Vec<FlowKind> {
        let pending = self.pending.read().await;
        FlowKind::PRIORITY
            .into_iter()
            .filter(|kind| pending.contains_key(&(user_id, *kind)))
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn load_session(&self, user_id: i64) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.read().await.get(&user_id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        self.sessions
            .write()
            .await
            .insert(session.user_id, session.clone());
        Ok(())
    }

    async fn delete_session(&self, user_id: i64) -> Result<(), StorageError> {
        self.sessions.write().await.remove(&user_id);
        Ok(())
    }

    async fn sweep_sessions(&self, ttl: Duration) -> Result<usize, StorageError> {
        let cutoff = cutoff(ttl);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_updated >= cutoff);
        Ok(before - sessions.len())
    }
}

#[async_trait]
impl PendingStateStore for MemoryStorage {
    async fn set_pending(&self, user_id: i64, state: &FlowState) -> Result<(), StorageError> {
        let record = PendingRecord::new(user_id, state)?;
        self.pending
            .write()
            .await
            .insert((user_id, state.kind()), record);
        Ok(())
    }

    async fn get_pending(
        &self,
        user_id: i64,
        kind: FlowKind,
    ) -> Result<Option<FlowState>, StorageError> {
        let pending = self.pending.read().await;
        let Some(record) = pending.get(&(user_id, kind)) else {
            return Ok(None);
        };
        record
            .decode()
            .map(Some)
            .ok_or_else(|| StorageError::Corrupt(user_pending_key(user_id, kind)))
    }

    async fn clear_pending(&self, user_id: i64, kind: FlowKind) -> Result<bool, StorageError> {
        Ok(self.pending.write().await.remove(&(user_id, kind)).is_some())
    }

    async fn sweep_pending(&self, ttl: Duration) -> Result<usize, StorageError> {
        let cutoff = cutoff(ttl);
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, r| r.updated_at >= cutoff);
        Ok(before - pending.len())
    }
}

#[async_trait]
impl WalletDirectory for MemoryStorage {
    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<WalletRecord>, StorageError> {
        Ok(self.wallets.read().await.get(&wallet_id).cloned())
    }

    async fn list_wallets(&self, user_id: i64) -> Result<Vec<WalletRecord>, StorageError> {
        let mut wallets: Vec<_> = self
            .wallets
            .read()
            .await
            .values()
            .filter(|w| w.is_owned_by(user_id))
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.id);
        Ok(wallets)
    }

    async fn update_label(&self, wallet_id: i64, label: &str) -> Result<bool, StorageError> {
        Ok(self
            .wallets
            .write()
            .await
            .get_mut(&wallet_id)
            .map(|w| w.label = Some(label.to_string()))
            .is_some())
    }

    async fn delete_wallet(&self, wallet_id: i64) -> Result<bool, StorageError> {
        Ok(self.wallets.write().await.remove(&wallet_id).is_some())
    }
}

#[async_trait]
impl TwoFactorStore for MemoryStorage {
    async fn get_two_factor(&self, user_id: i64) -> Result<Option<TwoFactorRecord>, StorageError> {
        Ok(self.two_factor.read().await.get(&user_id).cloned())
    }

    async fn store_pending_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError> {
        self.insert_two_factor(
            user_id,
            TwoFactorRecord {
                secret: secret.to_string(),
                enabled: false,
            },
        )
        .await;
        Ok(())
    }

    async fn activate_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError> {
        self.insert_two_factor(
            user_id,
            TwoFactorRecord {
                secret: secret.to_string(),
                enabled: true,
            },
        )
        .await;
        Ok(())
    }

    async fn erase_secret(&self, user_id: i64) -> Result<(), StorageError> {
        self.two_factor.write().await.remove(&user_id);
        Ok(())
    }

    async fn erase_pending_secret(&self, user_id: i64) -> Result<(), StorageError> {
        let mut records = self.two_factor.write().await;
        if records.get(&user_id).is_some_and(|r| !r.enabled) {
            records.remove(&user_id);
        }
        Ok(())
    }
}

fn cutoff(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
