//! The game loop and the state it owns.
//!
//! One dedicated thread runs [`GameLoop::run`]; it is the sole mutator of
//! every per-channel entity table. Each 50 ms tick drains the input queue,
//! integrates movement, advances monster AI, resolves auto-attacks,
//! processes deaths and respawns, and finally flushes the broadcast stage.

pub mod ai;
pub mod broadcast;
pub mod combat;
pub mod death;
pub mod handlers;
pub mod movement;
pub mod skill;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use skyrift_protocol::messages::system::ServerMessage;
use skyrift_protocol::{ErrorCode, Opcode};
use skyrift_registry::GameDefs;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::entity::Player;
use crate::id::{AccountId, ChannelId, ConnId, EntityId, ZoneId};
use crate::persist::{PersistHandle, PersistJob};
use crate::queue::{InputEvent, InputQueue};
use crate::session::{HeartbeatTracker, SessionSecretCache};
use crate::validate::FixedWindow;
use crate::world::WorldMap;
use broadcast::{BroadcastStage, ConnectionTable, DatagramSink, DeltaPolicy, IdentityDelta};

/// Chat messages allowed per account per second.
const CHAT_RATE_LIMIT: u32 = 4;

/// A player pulled out of the world while its force-flush is in flight.
pub struct PendingTransfer {
    pub player: Box<Player>,
    pub kind: TransferKind,
}

pub enum TransferKind {
    Zone { target: ZoneId },
    Channel { target: ChannelId },
}

/// Everything the tick owns.
pub struct GameState {
    pub config: ServerConfig,
    pub defs: Arc<GameDefs>,
    pub world: WorldMap,
    pub connections: ConnectionTable,
    /// Live account → player entity.
    pub accounts: FxHashMap<AccountId, EntityId>,
    /// Authenticated connection → player entity.
    pub conn_players: FxHashMap<ConnId, EntityId>,
    pub secret_cache: SessionSecretCache,
    pub heartbeats: HeartbeatTracker,
    pub broadcast: BroadcastStage,
    pub udp_sink: Arc<dyn DatagramSink>,
    /// Position-update encoding policy; identity until delta compression
    /// lands.
    pub delta: Box<dyn DeltaPolicy>,
    pub persist: PersistHandle,
    /// Players between channels, waiting on their force-flush.
    pub transfers: FxHashMap<AccountId, PendingTransfer>,
    /// Per-account chat rate limiters.
    pub chat_windows: FxHashMap<AccountId, FixedWindow>,
    pub rng: StdRng,
    /// Milliseconds since the loop started; the time base for every
    /// cooldown, attack timer and ownership window in the domain.
    pub now_ms: u64,
}

impl GameState {
    pub fn new(
        config: ServerConfig,
        defs: Arc<GameDefs>,
        secret_cache: SessionSecretCache,
        heartbeats: HeartbeatTracker,
        udp_sink: Arc<dyn DatagramSink>,
        persist: PersistHandle,
    ) -> Self {
        let world = WorldMap::new(defs.clone(), &config);

        Self {
            config,
            defs,
            world,
            connections: ConnectionTable::new(),
            accounts: FxHashMap::default(),
            conn_players: FxHashMap::default(),
            secret_cache,
            heartbeats,
            broadcast: BroadcastStage::new(),
            udp_sink,
            delta: Box::new(IdentityDelta),
            persist,
            transfers: FxHashMap::default(),
            chat_windows: FxHashMap::default(),
            rng: StdRng::from_entropy(),
            now_ms: 0,
        }
    }

    pub fn player_entity(&self, conn_id: ConnId) -> Option<EntityId> {
        self.conn_players.get(&conn_id).copied()
    }

    pub fn chat_window(&mut self, account_id: AccountId) -> &mut FixedWindow {
        self.chat_windows
            .entry(account_id)
            .or_insert_with(|| FixedWindow::new(CHAT_RATE_LIMIT, 1000))
    }
}

pub struct GameLoop {
    pub state: GameState,
    queue: InputQueue,
    last_tier1_ms: u64,
    tick_count: u64,
}

impl GameLoop {
    pub fn new(state: GameState, queue: InputQueue) -> Self {
        Self {
            state,
            queue,
            last_tier1_ms: 0,
            tick_count: 0,
        }
    }

    /// Runs until a shutdown event arrives. Owns the calling thread.
    pub fn run(&mut self) {
        let interval = self.state.config.tick_interval();
        let epoch = Instant::now();
        let mut next = epoch + interval;

        info!(tick_hz = self.state.config.tick_hz, "game loop started");

        loop {
            let now_ms = epoch.elapsed().as_millis() as u64;
            if self.tick(now_ms) {
                break;
            }

            let now = Instant::now();
            if now < next {
                std::thread::sleep(next - now);
            }
            next += interval;
        }

        info!("game loop stopped");
    }

    /// One tick at the given loop time. Returns `true` on shutdown.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let started = Instant::now();
        self.state.now_ms = now_ms;
        self.tick_count += 1;

        let mut shutdown = false;

        // Phase 1: drain the input queue in FIFO order.
        for event in self.queue.drain() {
            if matches!(event, InputEvent::Shutdown) {
                shutdown = true;
                continue;
            }

            let conn_hint = match &event {
                InputEvent::Connected { conn_id, .. }
                | InputEvent::Frame { conn_id, .. }
                | InputEvent::Disconnected { conn_id }
                | InputEvent::EnterWorldResolved { conn_id, .. } => Some(*conn_id),
                _ => None,
            };

            // A single bad packet must never abort the tick.
            let state = &mut self.state;
            if catch_unwind(AssertUnwindSafe(|| handlers::dispatch(state, event))).is_err() {
                error!("handler panicked; packet dropped");
                if let Some(conn_id) = conn_hint {
                    self.state
                        .broadcast
                        .stage_error(conn_id, 0, ErrorCode::ServerError);
                }
            }
        }

        // Phases 2–5: movement, AI, auto-attacks, deaths, respawns.
        movement::run(&mut self.state);
        ai::run(&mut self.state);
        combat_phase(&mut self.state);
        death::run(&mut self.state);
        death::run_respawns(&mut self.state);

        self.accumulate_playtime();
        self.maybe_flush_tier1();

        // Phase 6: every touched socket flushed exactly once.
        self.state
            .broadcast
            .finish_tick(&mut self.state.connections);

        let elapsed = started.elapsed();
        if elapsed > self.state.config.tick_interval() {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                "tick overran its budget"
            );
        }

        if shutdown {
            self.shutdown();
        }
        shutdown
    }

    fn accumulate_playtime(&mut self) {
        let dt = self.state.config.tick_ms();
        for channel in self.state.world.channels_mut() {
            for player in channel.players.values_mut() {
                player.playtime_ms += dt;
            }
        }
    }

    /// The RAM → cache tier: snapshot every dirty player, clear the flags,
    /// hand the batch to the persistence executor.
    fn maybe_flush_tier1(&mut self) {
        let cadence_ms = self.state.config.ram_to_cache_sec * 1000;
        if self.state.now_ms.saturating_sub(self.last_tier1_ms) < cadence_ms {
            return;
        }
        self.last_tier1_ms = self.state.now_ms;

        let mut states = Vec::new();
        for channel in self.state.world.channels_mut() {
            for player in channel.players.values_mut() {
                if player.dirty {
                    states.push(player.state_snapshot());
                    player.dirty = false;
                }
            }
        }

        if !states.is_empty() {
            self.state.persist.send(PersistJob::Tier1 { states });
        }
    }

    /// Graceful exit: announce, then run the disconnect path for every
    /// live connection so each character gets its force-flush.
    fn shutdown(&mut self) {
        info!(
            connections = self.state.connections.len(),
            "shutting down, flushing live characters"
        );

        let notice = ServerMessage {
            text: "server shutting down".to_owned(),
        };
        for conn_id in self.state.connections.conn_ids() {
            self.state
                .broadcast
                .stage(conn_id, Opcode::ServerMessage, &notice);
            handlers::disconnect(&mut self.state, conn_id);
        }
        self.state
            .broadcast
            .finish_tick(&mut self.state.connections);
    }
}

/// Phase 4: player auto-attacks.
fn combat_phase(state: &mut GameState) {
    let now_ms = state.now_ms;
    let defs = state.defs.clone();
    let player_ids = state.world.live_player_ids();

    for attacker_id in player_ids {
        let Some(channel) = state.world.player_channel_mut(attacker_id) else {
            continue;
        };

        let (target_id, attack_value) = {
            let Some(player) = channel.players.get(&attacker_id) else {
                continue;
            };
            if !player.auto_attack || player.target_id == 0 || !player.is_alive() {
                continue;
            }
            if now_ms.saturating_sub(player.last_attack_ms) < combat::AUTO_ATTACK_COOLDOWN_MS {
                continue;
            }
            (player.target_id, i64::from(player.attack_power(&defs)))
        };

        // Target must be live and in reach.
        let in_range = match (
            channel.entity_position(target_id),
            channel.entity_alive(target_id),
        ) {
            (Some(pos), Some(true)) => {
                let attacker_pos = channel.players[&attacker_id].position;
                crate::validate::within_range(attacker_pos, pos, combat::AUTO_ATTACK_RANGE)
            }
            _ => false,
        };
        if !in_range {
            continue;
        }

        let outcome = combat::resolve_hit(
            channel,
            &defs,
            &mut state.rng,
            attacker_id,
            target_id,
            attack_value,
            crate::entity::PLAYER_CRIT_CHANCE,
        );

        if let Some(hit) = outcome {
            if let Some(player) = channel.players.get_mut(&attacker_id) {
                player.last_attack_ms = now_ms;
            }
            handlers::broadcast_damage(channel, &mut state.broadcast, &hit, 0);
        }
    }
}
