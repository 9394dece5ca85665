//! The manual-stepping test harness.
//!
//! Builds a full game loop over the in-memory collaborators, with mock TCP
//! connections and a recording UDP sink. Tests drive the tick by hand and
//! await the persistence workers where a flow crosses executors.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use prost::Message;
use skyrift_protocol::messages::auth::EnterWorld;
use skyrift_protocol::{datagram, encode_payload, Datagram, FrameDecoder, Opcode, SessionToken};
use skyrift_registry::{
    EquipSlotType, GameDefs, ItemDef, LootEntry, MonsterDef, NpcDef, SkillDef, SpawnDef, ZoneDef,
};
use skyrift_server::auth::{sign_hs256, Claims, Hs256Verifier};
use skyrift_server::entity::StatBlock;
use skyrift_server::id::{AccountId, CharacterId, ConnId, EntityId};
use skyrift_server::persist::memory::{
    MemoryAccountProvider, MemoryCharacterProvider, MemorySessionStore, MemoryStateCache,
};
use skyrift_server::persist::{spawn_workers, CharacterRecord, Collaborators};
use skyrift_server::queue::{InputEvent, InputQueue};
use skyrift_server::session::{
    generate_secret, generate_token, HeartbeatTracker, PlayerConnection, SessionSecretCache,
};
use skyrift_server::{DatagramSink, GameLoop, GameState, ServerConfig};

pub const JWT_SECRET: &[u8] = b"test-login-secret";

/// Well-known fixture ids.
pub const ZONE_MEADOW: u32 = 1;
pub const ZONE_PEAKS: u32 = 2;
pub const MONSTER_WISP: u32 = 1;
pub const SKILL_WIND_CUTTER: u32 = 7;
pub const ITEM_WISP_DUST: u32 = 10;
pub const ITEM_SWORD: u32 = 20;
pub const NPC_VENDOR: u64 = 900;

/// The wisp spawn point, far from the zone spawn so tests opt in to
/// contact.
pub const WISP_SPAWN: [f32; 3] = [100.0, 0.0, 100.0];

#[derive(Clone, Default)]
pub struct MockConnection {
    pub written: Arc<Mutex<Vec<BytesMut>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl MockConnection {
    /// Every frame the server has sent on this connection so far.
    pub fn frames(&self) -> Vec<(u16, Bytes)> {
        let mut dec = FrameDecoder::new();
        for chunk in self.written.lock().unwrap().iter() {
            dec.queue_slice(chunk);
        }

        let mut frames = Vec::new();
        while let Ok(Some(frame)) = dec.try_next_frame() {
            frames.push((frame.opcode, frame.body.freeze()));
        }
        frames
    }

    pub fn frames_of(&self, opcode: Opcode) -> Vec<Bytes> {
        self.frames()
            .into_iter()
            .filter(|(raw, _)| *raw == opcode.to_raw())
            .map(|(_, body)| body)
            .collect()
    }

    pub fn error_codes(&self) -> Vec<(u32, u32)> {
        self.frames_of(Opcode::ErrorResponse)
            .iter()
            .map(|body| {
                let err =
                    skyrift_protocol::messages::system::ErrorResponse::decode(&body[..]).unwrap();
                (err.opcode, err.code)
            })
            .collect()
    }

    pub fn clear(&self) {
        self.written.lock().unwrap().clear();
    }
}

impl PlayerConnection for MockConnection {
    fn try_send(&mut self, bytes: BytesMut) -> anyhow::Result<()> {
        self.written.lock().unwrap().push(bytes);
        Ok(())
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }

    fn remote_ip(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl RecordingSink {
    /// Parsed (destination, opcode, payload) triples.
    pub fn datagrams(&self) -> Vec<(SocketAddr, u16, Vec<u8>)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(addr, bytes)| {
                Datagram::parse(bytes)
                    .ok()
                    .map(|d| (*addr, d.opcode, d.payload.to_vec()))
            })
            .collect()
    }

    pub fn count_of(&self, opcode: Opcode) -> usize {
        self.datagrams()
            .iter()
            .filter(|(_, raw, _)| *raw == opcode.to_raw())
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl DatagramSink for RecordingSink {
    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>) {
        self.sent.lock().unwrap().push((addr, bytes));
    }
}

pub struct PlayerHandle {
    pub account_id: AccountId,
    pub character_id: CharacterId,
    pub entity_id: EntityId,
    pub conn_id: ConnId,
    pub token: SessionToken,
    pub conn: MockConnection,
    pub udp_addr: SocketAddr,
    next_seq: u32,
}

impl PlayerHandle {
    pub fn next_seq(&mut self) -> u32 {
        self.next_seq += 1;
        self.next_seq
    }
}

pub struct Harness {
    pub game: GameLoop,
    /// Pushes events the way the I/O producers would.
    pub queue_sender: skyrift_server::InputSender,
    pub sessions: Arc<MemorySessionStore>,
    pub characters: Arc<MemoryCharacterProvider>,
    pub cache: Arc<MemoryStateCache>,
    pub accounts: Arc<MemoryAccountProvider>,
    pub udp: Arc<RecordingSink>,
    pub now_ms: u64,
    next_conn_id: ConnId,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let defs = Arc::new(fixture_defs());
        let queue = InputQueue::new(config.input_queue_cap);
        let sender = queue.sender();

        let sessions = Arc::new(MemorySessionStore::new());
        let characters = Arc::new(MemoryCharacterProvider::new());
        let cache = Arc::new(MemoryStateCache::new());
        let accounts = Arc::new(MemoryAccountProvider::new());

        let collab = Collaborators {
            accounts: accounts.clone(),
            characters: characters.clone(),
            sessions: sessions.clone(),
            cache: cache.clone(),
            jwt: Arc::new(Hs256Verifier::new(JWT_SECRET)),
        };
        let persist = spawn_workers(collab, queue.sender(), &config);

        let udp = Arc::new(RecordingSink::default());
        let state = GameState::new(
            config,
            defs,
            SessionSecretCache::new(),
            HeartbeatTracker::new(),
            udp.clone(),
            persist,
        );

        Self {
            game: GameLoop::new(state, queue),
            queue_sender: sender,
            sessions,
            characters,
            cache,
            accounts,
            udp,
            now_ms: 0,
            next_conn_id: 1,
        }
    }

    pub fn state(&mut self) -> &mut GameState {
        &mut self.game.state
    }

    /// One 50 ms tick.
    pub fn tick(&mut self) {
        self.now_ms += 50;
        self.game.tick(self.now_ms);
    }

    /// Advances game time by running whole ticks.
    pub fn advance_ms(&mut self, ms: u64) {
        for _ in 0..ms.div_ceil(50) {
            self.tick();
        }
    }

    /// Ticks while yielding to the persistence workers, until `done` or
    /// the deadline.
    pub async fn settle_until(&mut self, mut done: impl FnMut(&mut Self) -> bool) -> bool {
        for _ in 0..400 {
            if done(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.tick();
        }
        false
    }

    pub fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Seeds a character row and a live session the way the login service
    /// would.
    pub fn seed_character(
        &mut self,
        account_id: AccountId,
        character_id: CharacterId,
        name: &str,
    ) -> (SessionToken, String) {
        self.characters.insert(character_record(
            account_id,
            character_id,
            name,
        ));
        self.seed_session(account_id, character_id)
    }

    /// Seeds a fresh session (token + secret + JWT) for an account.
    pub fn seed_session(
        &mut self,
        account_id: AccountId,
        character_id: CharacterId,
    ) -> (SessionToken, String) {
        let token = generate_token();
        let secret = generate_secret();

        self.sessions.put(
            token,
            skyrift_server::persist::SessionRecord {
                account_id,
                character_id: Some(character_id),
                hmac_secret: secret,
                created_unix: Self::unix_now(),
            },
        );

        let jwt = sign_hs256(
            JWT_SECRET,
            &Claims {
                account_id,
                session_id: token.to_string(),
                iat: Self::unix_now() - 10,
                exp: Self::unix_now() + 3600,
            },
        );

        (token, jwt)
    }

    pub fn connect(&mut self) -> (ConnId, MockConnection) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        let conn = MockConnection::default();
        self.queue_sender.push(InputEvent::Connected {
            conn_id,
            handle: Box::new(conn.clone()),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        });
        (conn_id, conn)
    }

    pub fn push_frame<M: Message>(&mut self, conn_id: ConnId, opcode: Opcode, msg: &M) {
        self.queue_sender.push(InputEvent::Frame {
            conn_id,
            opcode: opcode.to_raw(),
            body: Bytes::from(encode_payload(msg)),
        });
    }

    /// Full EnterWorld round trip. Panics if the player does not land in
    /// the world.
    pub async fn enter_world(
        &mut self,
        account_id: AccountId,
        character_id: CharacterId,
        name: &str,
    ) -> PlayerHandle {
        let (token, jwt) = self.seed_character(account_id, character_id, name);
        self.enter_world_with(account_id, character_id, token, jwt)
            .await
            .expect("enter world")
    }

    /// EnterWorld with explicit credentials; returns `None` on rejection.
    pub async fn enter_world_with(
        &mut self,
        account_id: AccountId,
        character_id: CharacterId,
        token: SessionToken,
        jwt: String,
    ) -> Option<PlayerHandle> {
        let (conn_id, conn) = self.connect();

        self.push_frame(
            conn_id,
            Opcode::EnterWorld,
            &EnterWorld {
                character_id: character_id as u64,
                session_token: token.as_bytes().to_vec(),
                jwt,
            },
        );

        let landed = self
            .settle_until(|h| {
                h.state().player_entity(conn_id).is_some() || !conn.error_codes().is_empty()
            })
            .await;

        let Some(entity_id) = self.state().player_entity(conn_id) else {
            return None;
        };
        assert!(landed);
        assert_eq!(self.state().accounts.get(&account_id), Some(&entity_id));
        let udp_addr: SocketAddr = format!("127.0.0.1:{}", 40_000 + conn_id).parse().unwrap();

        Some(PlayerHandle {
            account_id,
            character_id,
            entity_id,
            conn_id,
            token,
            conn,
            udp_addr,
            next_seq: 0,
        })
    }

    /// Runs the UDP gate pipeline (seal, parse, MAC, sequence) against a
    /// message and hands it to the queue exactly like the UDP worker.
    /// Returns whether the datagram survived the gates.
    pub fn send_datagram<M: Message>(
        &mut self,
        player: &PlayerHandle,
        sequence: u32,
        opcode: Opcode,
        msg: &M,
    ) -> bool {
        let Some(session) = self.state().secret_cache.get(&player.token) else {
            return false;
        };

        let payload = encode_payload(msg);
        let sealed = datagram::seal(
            player.token,
            sequence,
            opcode.to_raw(),
            &payload,
            session.secret(),
        )
        .unwrap();

        let parsed = Datagram::parse(&sealed).unwrap();
        if parsed.verify_mac(session.secret()).is_err() {
            return false;
        }
        if !session.accept_sequence(parsed.sequence) {
            return false;
        }

        self.queue_sender.push(InputEvent::Datagram {
            token: player.token,
            sequence,
            opcode: opcode.to_raw(),
            payload: Bytes::copy_from_slice(parsed.payload),
            addr: player.udp_addr,
        });
        true
    }

    /// Teleports an entity, keeping the grid honest. Test-only shortcut
    /// for scenario setup.
    pub fn set_position(&mut self, entity_id: EntityId, x: f32, y: f32, z: f32) {
        let position = skyrift_math::vec3(x, y, z);
        let channel = self
            .state()
            .world
            .player_channel_mut(entity_id)
            .expect("entity is a placed player");
        let player = channel.players.get_mut(&entity_id).unwrap();
        player.position = position;
        channel.grid.update(entity_id, x, z);
    }

    /// The first wisp in the given player's channel.
    pub fn wisp_in_channel_of(&mut self, entity_id: EntityId) -> EntityId {
        let channel = self
            .state()
            .world
            .player_channel_mut(entity_id)
            .expect("player placed");
        *channel
            .monsters
            .keys()
            .next()
            .expect("fixture spawns a wisp")
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: String::from_utf8(JWT_SECRET.to_vec()).unwrap(),
        // Flush cadences long enough that tests control them explicitly.
        ram_to_cache_sec: 3600,
        cache_to_store_sec: 3600,
        ..ServerConfig::default()
    }
}

pub fn character_record(
    account_id: AccountId,
    character_id: CharacterId,
    name: &str,
) -> CharacterRecord {
    CharacterRecord {
        character_id,
        account_id,
        name: name.to_owned(),
        class_id: 1,
        level: 1,
        xp: 0,
        hp: 100,
        mp: 100,
        stats: StatBlock {
            strength: 10,
            stamina: 0,
            dexterity: 0,
            intellect: 5,
            unspent_points: 0,
        },
        position: [0.0, 0.0, 0.0],
        rotation: 0.0,
        zone_id: ZONE_MEADOW,
        gold: 500,
        playtime_ms: 0,
        skills: vec![(SKILL_WIND_CUTTER, 1)],
        inventory: vec![],
        equipment: vec![],
        deleted: false,
    }
}

fn fixture_defs() -> GameDefs {
    GameDefs::from_parts(
        vec![
            ItemDef {
                id: ITEM_WISP_DUST,
                name: "Wisp Dust".to_owned(),
                equip_slot: None,
                attack: 0,
                defense: 0,
                buy_price: 20,
                sell_price: 5,
                max_stack: 50,
                required_level: 0,
            },
            ItemDef {
                id: ITEM_SWORD,
                name: "Rusty Sword".to_owned(),
                equip_slot: Some(EquipSlotType::Weapon),
                attack: 4,
                defense: 0,
                buy_price: 100,
                sell_price: 25,
                max_stack: 1,
                required_level: 0,
            },
        ],
        vec![SkillDef {
            id: SKILL_WIND_CUTTER,
            name: "Wind Cutter".to_owned(),
            class_id: 0,
            mp_cost: 10,
            cooldown_ms: 3000,
            range: 5.0,
            base_damage: 50,
            damage_per_level: 2,
            max_level: 10,
        }],
        vec![MonsterDef {
            id: MONSTER_WISP,
            name: "Forest Wisp".to_owned(),
            level: 1,
            max_hp: 100,
            attack: 7,
            defense: 0,
            xp_reward: 25,
            aggro_range: 15.0,
            attack_range: 2.0,
            attack_speed_ms: 1500,
            move_speed: 3.0,
            respawn_ms: 5000,
            loot: vec![LootEntry {
                item_def_id: ITEM_WISP_DUST,
                amount_min: 1,
                amount_max: 1,
                drop_chance: 1.0,
            }],
        }],
        vec![
            ZoneDef {
                id: ZONE_MEADOW,
                name: "Aerie Meadow".to_owned(),
                spawn_x: 0.0,
                spawn_y: 0.0,
                spawn_z: 0.0,
                half_extent: 1000.0,
                npcs: vec![NpcDef {
                    id: NPC_VENDOR,
                    name: "Peddler Joss".to_owned(),
                    x: 5.0,
                    y: 0.0,
                    z: 0.0,
                    sells: vec![ITEM_WISP_DUST, ITEM_SWORD],
                }],
            },
            ZoneDef {
                id: ZONE_PEAKS,
                name: "Shiver Peaks".to_owned(),
                spawn_x: 0.0,
                spawn_y: 50.0,
                spawn_z: 0.0,
                half_extent: 1000.0,
                npcs: vec![],
            },
        ],
        vec![SpawnDef {
            zone_id: ZONE_MEADOW,
            monster_def_id: MONSTER_WISP,
            x: WISP_SPAWN[0],
            y: WISP_SPAWN[1],
            z: WISP_SPAWN[2],
            radius: 0.0,
            count: 1,
        }],
    )
    .unwrap()
}
