//! In-memory collaborator implementations.
//!
//! Used by the test suites and by local development runs without external
//! services. Behaviour matches the trait contracts exactly, including the
//! compare-and-set semantics of the account claim; availability toggles
//! simulate backend outages.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use skyrift_protocol::SessionToken;

use super::{
    AccountProvider, BanStatus, BelongingsSnapshot, CharacterProvider, CharacterRecord,
    CharacterState, PersistError, SessionRecord, SessionStore, StateCache,
};
use crate::id::{AccountId, CharacterId};

#[derive(Default)]
pub struct MemoryAccountProvider {
    bans: Mutex<FxHashMap<AccountId, BanStatus>>,
}

impl MemoryAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ban(&self, account_id: AccountId, status: BanStatus) {
        self.bans.lock().insert(account_id, status);
    }
}

#[async_trait]
impl AccountProvider for MemoryAccountProvider {
    async fn check_ban(&self, account_id: AccountId) -> Result<BanStatus, PersistError> {
        Ok(self
            .bans
            .lock()
            .get(&account_id)
            .copied()
            .unwrap_or(BanStatus {
                banned: false,
                until_unix: None,
            }))
    }

    async fn mark_login_time(&self, _account_id: AccountId) -> Result<(), PersistError> {
        Ok(())
    }
}

pub struct MemoryCharacterProvider {
    records: Mutex<FxHashMap<CharacterId, CharacterRecord>>,
    available: AtomicBool,
}

impl Default for MemoryCharacterProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCharacterProvider {
    pub fn new() -> Self {
        Self {
            records: Mutex::default(),
            available: AtomicBool::new(true),
        }
    }

    pub fn insert(&self, record: CharacterRecord) {
        self.records.lock().insert(record.character_id, record);
    }

    /// Simulates a store outage when set to `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The currently persisted record, for test assertions.
    pub fn record(&self, character_id: CharacterId) -> Option<CharacterRecord> {
        self.records.lock().get(&character_id).cloned()
    }

    fn check_available(&self) -> Result<(), PersistError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistError::Unavailable)
        }
    }
}

#[async_trait]
impl CharacterProvider for MemoryCharacterProvider {
    async fn load(
        &self,
        character_id: CharacterId,
        account_id: AccountId,
    ) -> Result<CharacterRecord, PersistError> {
        self.check_available()?;

        self.records
            .lock()
            .get(&character_id)
            .filter(|r| r.account_id == account_id && !r.deleted)
            .cloned()
            .ok_or(PersistError::NotFound)
    }

    async fn save(&self, state: &CharacterState) -> Result<(), PersistError> {
        self.check_available()?;

        let mut records = self.records.lock();
        let record = records
            .get_mut(&state.character_id)
            .ok_or(PersistError::NotFound)?;

        record.level = state.level;
        record.xp = state.xp;
        record.hp = state.hp;
        record.mp = state.mp;
        record.stats = state.stats;
        record.position = state.position;
        record.rotation = state.rotation;
        record.zone_id = state.zone_id;
        record.gold = state.gold;
        record.playtime_ms = state.playtime_ms;
        Ok(())
    }

    async fn save_belongings(&self, snapshot: &BelongingsSnapshot) -> Result<(), PersistError> {
        self.check_available()?;

        let mut records = self.records.lock();
        let record = records
            .get_mut(&snapshot.character_id)
            .ok_or(PersistError::NotFound)?;

        record.gold = snapshot.gold;
        record.inventory = snapshot.inventory.clone();
        record.equipment = snapshot.equipment.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<FxHashMap<SessionToken, SessionRecord>>,
    /// account → the token currently holding it.
    claims: Mutex<FxHashMap<AccountId, SessionToken>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a session as the login service would have.
    pub fn put(&self, token: SessionToken, record: SessionRecord) {
        self.sessions.lock().insert(token, record);
    }

    /// The token currently claiming the account, if any.
    pub fn account_claim(&self, account_id: AccountId) -> Option<SessionToken> {
        self.claims.lock().get(&account_id).copied()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, token: &SessionToken) -> Result<Option<SessionRecord>, PersistError> {
        Ok(self.sessions.lock().get(token).cloned())
    }

    async fn del(&self, token: &SessionToken) -> Result<(), PersistError> {
        self.sessions.lock().remove(token);
        Ok(())
    }

    async fn try_acquire_account(
        &self,
        account_id: AccountId,
        token: &SessionToken,
    ) -> Result<bool, PersistError> {
        let mut claims = self.claims.lock();

        match claims.get(&account_id) {
            Some(held) if held != token => Ok(false),
            _ => {
                claims.insert(account_id, *token);
                Ok(true)
            }
        }
    }

    async fn release_account(
        &self,
        account_id: AccountId,
        token: &SessionToken,
    ) -> Result<(), PersistError> {
        let mut claims = self.claims.lock();
        if claims.get(&account_id) == Some(token) {
            claims.remove(&account_id);
        }
        Ok(())
    }
}

pub struct MemoryStateCache {
    states: Mutex<FxHashMap<CharacterId, CharacterState>>,
    dirty: Mutex<FxHashSet<CharacterId>>,
    available: AtomicBool,
}

impl Default for MemoryStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateCache {
    pub fn new() -> Self {
        Self {
            states: Mutex::default(),
            dirty: Mutex::default(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().len()
    }

    pub fn state(&self, character_id: CharacterId) -> Option<CharacterState> {
        self.states.lock().get(&character_id).cloned()
    }

    fn check_available(&self) -> Result<(), PersistError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistError::Unavailable)
        }
    }
}

#[async_trait]
impl StateCache for MemoryStateCache {
    async fn put_character(&self, state: &CharacterState) -> Result<(), PersistError> {
        self.check_available()?;
        self.states.lock().insert(state.character_id, state.clone());
        Ok(())
    }

    async fn get_character(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<CharacterState>, PersistError> {
        self.check_available()?;
        Ok(self.states.lock().get(&character_id).cloned())
    }

    async fn set_dirty(&self, character_id: CharacterId) -> Result<(), PersistError> {
        self.check_available()?;
        self.dirty.lock().insert(character_id);
        Ok(())
    }

    async fn scan_dirty(&self) -> Result<Vec<CharacterId>, PersistError> {
        self.check_available()?;
        Ok(self.dirty.lock().iter().copied().collect())
    }

    async fn clear_dirty(&self, character_id: CharacterId) -> Result<(), PersistError> {
        self.check_available()?;
        self.dirty.lock().remove(&character_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(byte: u8) -> SessionToken {
        SessionToken::from_bytes([byte; 8])
    }

    #[tokio::test]
    async fn account_claim_is_compare_and_set() {
        let store = MemorySessionStore::new();

        assert!(store.try_acquire_account(1, &token(1)).await.unwrap());
        // Re-acquiring with the same token is idempotent.
        assert!(store.try_acquire_account(1, &token(1)).await.unwrap());
        // A different token is refused while the claim is held.
        assert!(!store.try_acquire_account(1, &token(2)).await.unwrap());

        // Releasing with the wrong token is a no-op.
        store.release_account(1, &token(2)).await.unwrap();
        assert!(!store.try_acquire_account(1, &token(2)).await.unwrap());

        store.release_account(1, &token(1)).await.unwrap();
        assert!(store.try_acquire_account(1, &token(2)).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_cache_errors() {
        let cache = MemoryStateCache::new();
        cache.set_available(false);

        let err = cache.scan_dirty().await.unwrap_err();
        assert!(matches!(err, PersistError::Unavailable));
    }
}
