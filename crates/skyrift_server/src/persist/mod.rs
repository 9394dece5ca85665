//! Persistence collaborators and the write-back pipeline.
//!
//! The core never talks to a database or cache directly; it consumes the
//! traits defined here. Production wiring injects implementations backed by
//! the shared cache and the database service; tests inject the in-memory
//! versions from [`memory`].

pub mod memory;
mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skyrift_protocol::SessionToken;
use thiserror::Error;

pub use worker::{
    spawn_workers, Collaborators, FlushNotice, PersistHandle, PersistJob, ReleaseSession,
};

use crate::entity::StatBlock;
use crate::id::{AccountId, CharacterId, ZoneId};

#[derive(Error, Debug)]
pub enum PersistError {
    /// The backing store cannot be reached right now. Retried by the
    /// flush pipeline; never surfaced to clients as-is.
    #[error("persistence backend unavailable")]
    Unavailable,
    #[error("record not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

/// One inventory slot as persisted.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot: u32,
    pub item_def_id: u32,
    pub amount: u32,
    pub enhancement: u32,
}

/// One equipment binding as persisted.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EquipRecord {
    pub slot_type: u32,
    pub inventory_slot: u32,
}

/// The full character row, loaded once at EnterWorld.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub character_id: CharacterId,
    pub account_id: AccountId,
    pub name: String,
    pub class_id: u32,
    pub level: u32,
    pub xp: u64,
    pub hp: u32,
    pub mp: u32,
    pub stats: StatBlock,
    pub position: [f32; 3],
    pub rotation: f32,
    pub zone_id: ZoneId,
    pub gold: u64,
    pub playtime_ms: u64,
    /// skill id → learned level pairs.
    pub skills: Vec<(u32, u32)>,
    pub inventory: Vec<SlotRecord>,
    pub equipment: Vec<EquipRecord>,
    pub deleted: bool,
}

/// The mutable field set flowing through the write-back tiers, keyed by
/// character id in the cache.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CharacterState {
    pub character_id: CharacterId,
    pub account_id: AccountId,
    pub level: u32,
    pub xp: u64,
    pub hp: u32,
    pub mp: u32,
    pub stats: StatBlock,
    pub position: [f32; 3],
    pub rotation: f32,
    pub zone_id: ZoneId,
    pub gold: u64,
    pub playtime_ms: u64,
}

/// Inventory, equipment and gold as one transactional unit.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BelongingsSnapshot {
    pub character_id: CharacterId,
    pub gold: u64,
    pub inventory: Vec<SlotRecord>,
    pub equipment: Vec<EquipRecord>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BanStatus {
    pub banned: bool,
    pub until_unix: Option<u64>,
}

/// A session row in the shared session store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub account_id: AccountId,
    pub character_id: Option<CharacterId>,
    pub hmac_secret: [u8; 32],
    pub created_unix: u64,
}

/// The account service. Owned by the login collaborator; the core only
/// reads ban state and stamps login times.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn check_ban(&self, account_id: AccountId) -> Result<BanStatus, PersistError>;
    async fn mark_login_time(&self, account_id: AccountId) -> Result<(), PersistError>;
}

/// The durable character store.
#[async_trait]
pub trait CharacterProvider: Send + Sync {
    /// Loads a character, verifying ownership. `NotFound` covers both a
    /// missing row and an ownership mismatch so the two are
    /// indistinguishable to a probing client.
    async fn load(
        &self,
        character_id: CharacterId,
        account_id: AccountId,
    ) -> Result<CharacterRecord, PersistError>;

    /// Writes the mutable state through to durable storage. Called by the
    /// tier-2 flusher and by force-flushes.
    async fn save(&self, state: &CharacterState) -> Result<(), PersistError>;

    /// Atomically replaces inventory, equipment and gold. This is the
    /// direct path that bypasses the write-back cache.
    async fn save_belongings(&self, snapshot: &BelongingsSnapshot) -> Result<(), PersistError>;
}

/// The shared session store, including the account reverse index used to
/// enforce one live session per account.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, token: &SessionToken) -> Result<Option<SessionRecord>, PersistError>;
    async fn del(&self, token: &SessionToken) -> Result<(), PersistError>;

    /// Atomically claims the account for `token`. Returns `false` when any
    /// other token currently holds the account, which covers both a live
    /// second session and the post-disconnect flush window.
    async fn try_acquire_account(
        &self,
        account_id: AccountId,
        token: &SessionToken,
    ) -> Result<bool, PersistError>;

    /// Releases the account claim if it is held by `token`.
    async fn release_account(
        &self,
        account_id: AccountId,
        token: &SessionToken,
    ) -> Result<(), PersistError>;
}

/// Tier-1 of the write-back pipeline: the per-character state hash plus a
/// dirty marker enumerable by the tier-2 flusher.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn put_character(&self, state: &CharacterState) -> Result<(), PersistError>;
    async fn get_character(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<CharacterState>, PersistError>;
    async fn set_dirty(&self, character_id: CharacterId) -> Result<(), PersistError>;
    async fn scan_dirty(&self) -> Result<Vec<CharacterId>, PersistError>;
    async fn clear_dirty(&self, character_id: CharacterId) -> Result<(), PersistError>;
}
