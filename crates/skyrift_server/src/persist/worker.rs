//! The persistence executor.
//!
//! One task drains the job channel (EnterWorld resolution, tier-1 batches,
//! transactional belongings saves, force-flushes); a second runs the tier-2
//! cache → durable sweep on its own interval. Domain handlers never touch a
//! store: they enqueue jobs here and, where ordering matters, wait for the
//! completion intent to come back through the input queue.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use skyrift_protocol::{ErrorCode, SessionToken};
use tracing::{debug, error, info, warn};

use super::{
    AccountProvider, BelongingsSnapshot, CharacterProvider, CharacterState, PersistError,
    SessionStore, StateCache,
};
use crate::auth::JwtVerifier;
use crate::config::ServerConfig;
use crate::id::{AccountId, CharacterId, ConnId};
use crate::queue::{EnterWorldSuccess, InputEvent, InputSender};

/// Delay between retries while the durable store is down.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// The injected collaborator set.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountProvider>,
    pub characters: Arc<dyn CharacterProvider>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn StateCache>,
    pub jwt: Arc<dyn JwtVerifier>,
}

/// Session to release once a disconnect flush lands durably.
pub struct ReleaseSession {
    pub account_id: AccountId,
    pub token: SessionToken,
}

/// Completion intent posted back to the tick.
pub enum FlushNotice {
    Transfer { account_id: AccountId },
}

pub enum PersistJob {
    /// Resolve an EnterWorld request: JWT, session, ban, multi-login gate,
    /// character load. Posts `EnterWorldResolved` back to the tick.
    ResolveEnterWorld {
        conn_id: ConnId,
        character_id: CharacterId,
        token: SessionToken,
        jwt: String,
    },
    /// Tier-1 batch: dirty player snapshots → cache + dirty markers.
    Tier1 { states: Vec<CharacterState> },
    /// Direct transactional save of inventory/equipment/gold.
    SaveBelongings { snapshot: BelongingsSnapshot },
    /// Synchronous write through both tiers. `release` hands back the
    /// account claim afterwards (disconnect); `notify` unblocks a pending
    /// zone/channel transfer (the tick realises the placement).
    ForceFlush {
        state: CharacterState,
        belongings: Option<BelongingsSnapshot>,
        release: Option<ReleaseSession>,
        notify: Option<FlushNotice>,
    },
    /// An EnterWorld resolved after its connection vanished; give the
    /// account claim back without any state to write.
    ReleaseAbandoned {
        account_id: AccountId,
        token: SessionToken,
    },
}

#[derive(Clone)]
pub struct PersistHandle {
    tx: flume::Sender<PersistJob>,
}

impl PersistHandle {
    pub fn send(&self, job: PersistJob) {
        if self.tx.send(job).is_err() {
            error!("persistence worker gone, dropping job");
        }
    }
}

/// Spawns the job worker and the tier-2 sweeper onto the current tokio
/// runtime. Returns the handle the tick uses to enqueue jobs.
pub fn spawn_workers(
    collab: Collaborators,
    events: InputSender,
    config: &ServerConfig,
) -> PersistHandle {
    let (tx, rx) = flume::unbounded::<PersistJob>();

    {
        let collab = collab.clone();
        tokio::spawn(async move {
            while let Ok(job) = rx.recv_async().await {
                handle_job(&collab, &events, job).await;
            }
            debug!("persistence job channel closed");
        });
    }

    {
        let collab = collab.clone();
        let interval = Duration::from_secs(config.cache_to_store_sec);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                run_tier2_sweep(&collab).await;
            }
        });
    }

    PersistHandle { tx }
}

async fn handle_job(collab: &Collaborators, events: &InputSender, job: PersistJob) {
    match job {
        PersistJob::ResolveEnterWorld {
            conn_id,
            character_id,
            token,
            jwt,
        } => {
            let outcome = resolve_enter_world(collab, character_id, &token, &jwt).await;
            events.push(InputEvent::EnterWorldResolved { conn_id, outcome });
        }
        PersistJob::Tier1 { states } => {
            for state in &states {
                if let Err(e) = write_tier1(collab, state).await {
                    warn!(
                        character = state.character_id,
                        error = %e,
                        "tier-1 flush failed, will retry next cycle"
                    );
                }
            }
        }
        PersistJob::SaveBelongings { snapshot } => {
            if !try_save_belongings(collab, &snapshot).await {
                // Retry off the job loop so an outage cannot starve other
                // persistence work.
                let collab = collab.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        if try_save_belongings(&collab, &snapshot).await {
                            return;
                        }
                    }
                });
            }
        }
        PersistJob::ForceFlush {
            state,
            belongings,
            release,
            notify,
        } => {
            force_flush(collab, events, state, belongings, release, notify).await;
        }
        PersistJob::ReleaseAbandoned { account_id, token } => {
            release_session(collab, &ReleaseSession { account_id, token }).await;
        }
    }
}

async fn resolve_enter_world(
    collab: &Collaborators,
    character_id: CharacterId,
    token: &SessionToken,
    jwt: &str,
) -> Result<Box<EnterWorldSuccess>, ErrorCode> {
    let now_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let claims = collab
        .jwt
        .verify(jwt, now_unix)
        .map_err(|_| ErrorCode::Unauthenticated)?;

    if claims.session_id != token.to_string() {
        return Err(ErrorCode::Unauthenticated);
    }

    let session = collab
        .sessions
        .get(token)
        .await
        .map_err(|_| ErrorCode::StoreUnavailable)?
        .ok_or(ErrorCode::SessionUnknown)?;

    if session.account_id != claims.account_id {
        return Err(ErrorCode::Unauthenticated);
    }

    let ban = collab
        .accounts
        .check_ban(claims.account_id)
        .await
        .map_err(|_| ErrorCode::StoreUnavailable)?;
    if ban.banned {
        let still_banned = ban.until_unix.map_or(true, |until| now_unix < until);
        if still_banned {
            return Err(ErrorCode::AccountBanned);
        }
    }

    // One live session per account: the claim is held from here until the
    // disconnect force-flush lands.
    let acquired = collab
        .sessions
        .try_acquire_account(claims.account_id, token)
        .await
        .map_err(|_| ErrorCode::StoreUnavailable)?;
    if !acquired {
        return Err(ErrorCode::SessionBusy);
    }

    let record = match collab.characters.load(character_id, claims.account_id).await {
        Ok(record) => record,
        Err(PersistError::NotFound) => {
            let _ = collab
                .sessions
                .release_account(claims.account_id, token)
                .await;
            return Err(ErrorCode::CharacterNotOwned);
        }
        Err(_) => {
            let _ = collab
                .sessions
                .release_account(claims.account_id, token)
                .await;
            return Err(ErrorCode::StoreUnavailable);
        }
    };

    if let Err(e) = collab.accounts.mark_login_time(claims.account_id).await {
        debug!(error = %e, "failed to stamp login time");
    }

    Ok(Box::new(EnterWorldSuccess {
        account_id: claims.account_id,
        token: *token,
        secret: session.hmac_secret,
        record,
    }))
}

async fn write_tier1(collab: &Collaborators, state: &CharacterState) -> Result<(), PersistError> {
    collab.cache.put_character(state).await?;
    collab.cache.set_dirty(state.character_id).await
}

/// One attempt at the transactional belongings save. `true` means done
/// (including the permanently-failed case, which only logging can help);
/// `false` means the store was unreachable and the caller should retry.
async fn try_save_belongings(collab: &Collaborators, snapshot: &BelongingsSnapshot) -> bool {
    match collab.characters.save_belongings(snapshot).await {
        Ok(()) => true,
        Err(PersistError::Unavailable) => {
            warn!(
                character = snapshot.character_id,
                "store unavailable for belongings save"
            );
            false
        }
        Err(e) => {
            error!(
                character = snapshot.character_id,
                error = %e,
                "belongings save failed permanently"
            );
            true
        }
    }
}

/// One attempt at the durable half of a force-flush: belongings first (when
/// present), then the character state.
async fn try_durable(
    collab: &Collaborators,
    state: &CharacterState,
    belongings: Option<&BelongingsSnapshot>,
) -> bool {
    if let Some(snapshot) = belongings {
        if !try_save_belongings(collab, snapshot).await {
            return false;
        }
    }
    collab.characters.save(state).await.is_ok()
}

/// Both tiers inline. When the durable store is down the flush degrades to
/// cache-only: a waiting transfer proceeds (the cache holds the state), but
/// a session release is deferred until a background retry lands the durable
/// write, keeping the account's re-login gate closed.
async fn force_flush(
    collab: &Collaborators,
    events: &InputSender,
    state: CharacterState,
    belongings: Option<BelongingsSnapshot>,
    release: Option<ReleaseSession>,
    notify: Option<FlushNotice>,
) {
    if let Err(e) = write_tier1(collab, &state).await {
        warn!(character = state.character_id, error = %e, "tier-1 write failed in force-flush");
    }

    if try_durable(collab, &state, belongings.as_ref()).await {
        let _ = collab.cache.clear_dirty(state.character_id).await;
        if let Some(notice) = notify {
            post_notice(events, notice);
        }
        if let Some(release) = release {
            release_session(collab, &release).await;
        }
        return;
    }

    warn!(
        character = state.character_id,
        "durable store down during force-flush, degrading to cache-only"
    );

    // The cache has the state; let a waiting transfer proceed.
    if let Some(notice) = notify {
        post_notice(events, notice);
    }

    let collab = collab.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RETRY_BACKOFF).await;
            if try_durable(&collab, &state, belongings.as_ref()).await {
                let _ = collab.cache.clear_dirty(state.character_id).await;
                if let Some(release) = &release {
                    release_session(&collab, release).await;
                }
                info!(
                    character = state.character_id,
                    "store recovered, force-flush completed"
                );
                return;
            }
        }
    });
}

fn post_notice(events: &InputSender, notice: FlushNotice) {
    match notice {
        FlushNotice::Transfer { account_id } => {
            events.push(InputEvent::FlushDone { account_id });
        }
    }
}

async fn release_session(collab: &Collaborators, release: &ReleaseSession) {
    let _ = collab.sessions.del(&release.token).await;
    let _ = collab
        .sessions
        .release_account(release.account_id, &release.token)
        .await;
}

/// The tier-2 sweep: every dirty marker becomes a durable write.
async fn run_tier2_sweep(collab: &Collaborators) {
    let dirty = match collab.cache.scan_dirty().await {
        Ok(dirty) => dirty,
        Err(e) => {
            warn!(error = %e, "cache unavailable, skipping tier-2 sweep");
            return;
        }
    };

    for character_id in dirty {
        if let Err(e) = flush_one(collab, character_id).await {
            warn!(character = character_id, error = %e, "tier-2 flush failed");
        }
    }
}

async fn flush_one(collab: &Collaborators, character_id: CharacterId) -> Result<(), PersistError> {
    let Some(state) = collab.cache.get_character(character_id).await? else {
        // Marker without a hash; drop the marker.
        collab.cache.clear_dirty(character_id).await?;
        return Ok(());
    };

    collab.characters.save(&state).await?;
    collab.cache.clear_dirty(character_id).await
}
