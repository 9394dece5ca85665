#![doc = include_str!("../README.md")]

mod defs;

use std::fs;
use std::path::Path;

pub use defs::{
    EquipSlotType, ItemDef, LootEntry, MonsterDef, NpcDef, SkillDef, SpawnDef, ZoneDef,
};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        source: serde_json::Error,
    },
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u64 },
    #[error("{referrer} references missing {kind} id {id}")]
    DanglingRef {
        referrer: String,
        kind: &'static str,
        id: u64,
    },
}

/// The loaded, validated definition set.
///
/// Zones keep file order (channel lists and zone rosters are presented in
/// authoring order); everything else is looked up by id.
pub struct GameDefs {
    items: FxHashMap<u32, ItemDef>,
    skills: FxHashMap<u32, SkillDef>,
    monsters: FxHashMap<u32, MonsterDef>,
    zones: IndexMap<u32, ZoneDef>,
    spawns: Vec<SpawnDef>,
}

#[derive(Deserialize)]
struct RawDefs {
    #[serde(default)]
    items: Vec<ItemDef>,
    #[serde(default)]
    skills: Vec<SkillDef>,
    #[serde(default)]
    monsters: Vec<MonsterDef>,
    #[serde(default)]
    zones: Vec<ZoneDef>,
    #[serde(default)]
    spawns: Vec<SpawnDef>,
}

impl GameDefs {
    /// Loads every definition file under `dir`.
    ///
    /// Files are keyed by name: `items.json`, `skills.json`,
    /// `monsters.json`, `zones.json`, `spawns.json`. Missing files mean an
    /// empty section.
    pub fn load_dir(dir: &Path) -> Result<Self, RegistryError> {
        let mut raw = RawDefs {
            items: Vec::new(),
            skills: Vec::new(),
            monsters: Vec::new(),
            zones: Vec::new(),
            spawns: Vec::new(),
        };

        for (file, section) in [
            ("items.json", Section::Items),
            ("skills.json", Section::Skills),
            ("monsters.json", Section::Monsters),
            ("zones.json", Section::Zones),
            ("spawns.json", Section::Spawns),
        ] {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }

            let text = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                file: file.to_owned(),
                source,
            })?;

            section.parse_into(&text, file, &mut raw)?;
        }

        Self::from_raw(raw)
    }

    /// Builds a definition set from in-memory parts. Primarily for tests
    /// and tooling; validation is identical to [`GameDefs::load_dir`].
    pub fn from_parts(
        items: Vec<ItemDef>,
        skills: Vec<SkillDef>,
        monsters: Vec<MonsterDef>,
        zones: Vec<ZoneDef>,
        spawns: Vec<SpawnDef>,
    ) -> Result<Self, RegistryError> {
        Self::from_raw(RawDefs {
            items,
            skills,
            monsters,
            zones,
            spawns,
        })
    }

    fn from_raw(raw: RawDefs) -> Result<Self, RegistryError> {
        let mut items = FxHashMap::default();
        for item in raw.items {
            let id = item.id;
            if items.insert(id, item).is_some() {
                return Err(RegistryError::DuplicateId {
                    kind: "item",
                    id: u64::from(id),
                });
            }
        }

        let mut skills = FxHashMap::default();
        for skill in raw.skills {
            let id = skill.id;
            if skills.insert(id, skill).is_some() {
                return Err(RegistryError::DuplicateId {
                    kind: "skill",
                    id: u64::from(id),
                });
            }
        }

        let mut monsters = FxHashMap::default();
        for monster in raw.monsters {
            let id = monster.id;
            if monsters.insert(id, monster).is_some() {
                return Err(RegistryError::DuplicateId {
                    kind: "monster",
                    id: u64::from(id),
                });
            }
        }

        let mut zones = IndexMap::new();
        for zone in raw.zones {
            let id = zone.id;
            if zones.insert(id, zone).is_some() {
                return Err(RegistryError::DuplicateId {
                    kind: "zone",
                    id: u64::from(id),
                });
            }
        }

        let defs = Self {
            items,
            skills,
            monsters,
            zones,
            spawns: raw.spawns,
        };

        defs.validate()?;
        Ok(defs)
    }

    /// Cross-reference check run once at startup. A dangling reference in
    /// the data files is a deployment error, not a runtime condition.
    fn validate(&self) -> Result<(), RegistryError> {
        for monster in self.monsters.values() {
            for entry in &monster.loot {
                if !self.items.contains_key(&entry.item_def_id) {
                    return Err(RegistryError::DanglingRef {
                        referrer: format!("monster {} loot", monster.id),
                        kind: "item",
                        id: u64::from(entry.item_def_id),
                    });
                }
            }
        }

        for spawn in &self.spawns {
            if !self.zones.contains_key(&spawn.zone_id) {
                return Err(RegistryError::DanglingRef {
                    referrer: format!("spawn of monster {}", spawn.monster_def_id),
                    kind: "zone",
                    id: u64::from(spawn.zone_id),
                });
            }
            if !self.monsters.contains_key(&spawn.monster_def_id) {
                return Err(RegistryError::DanglingRef {
                    referrer: format!("spawn in zone {}", spawn.zone_id),
                    kind: "monster",
                    id: u64::from(spawn.monster_def_id),
                });
            }
        }

        for zone in self.zones.values() {
            for npc in &zone.npcs {
                for item_id in &npc.sells {
                    if !self.items.contains_key(item_id) {
                        return Err(RegistryError::DanglingRef {
                            referrer: format!("npc {} in zone {}", npc.id, zone.id),
                            kind: "item",
                            id: u64::from(*item_id),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn item(&self, id: u32) -> Option<&ItemDef> {
        self.items.get(&id)
    }

    pub fn skill(&self, id: u32) -> Option<&SkillDef> {
        self.skills.get(&id)
    }

    pub fn monster(&self, id: u32) -> Option<&MonsterDef> {
        self.monsters.get(&id)
    }

    pub fn zone(&self, id: u32) -> Option<&ZoneDef> {
        self.zones.get(&id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &ZoneDef> {
        self.zones.values()
    }

    pub fn spawns_in_zone(&self, zone_id: u32) -> impl Iterator<Item = &SpawnDef> {
        self.spawns.iter().filter(move |s| s.zone_id == zone_id)
    }

    /// Finds an NPC by id anywhere in the world, with its zone.
    pub fn npc(&self, npc_id: u64) -> Option<(&ZoneDef, &NpcDef)> {
        self.zones.values().find_map(|zone| {
            zone.npcs
                .iter()
                .find(|npc| npc.id == npc_id)
                .map(|npc| (zone, npc))
        })
    }
}

enum Section {
    Items,
    Skills,
    Monsters,
    Zones,
    Spawns,
}

impl Section {
    fn parse_into(
        &self,
        text: &str,
        file: &str,
        raw: &mut RawDefs,
    ) -> Result<(), RegistryError> {
        let parse_err = |source| RegistryError::Parse {
            file: file.to_owned(),
            source,
        };

        match self {
            Self::Items => raw.items = serde_json::from_str(text).map_err(parse_err)?,
            Self::Skills => raw.skills = serde_json::from_str(text).map_err(parse_err)?,
            Self::Monsters => raw.monsters = serde_json::from_str(text).map_err(parse_err)?,
            Self::Zones => raw.zones = serde_json::from_str(text).map_err(parse_err)?,
            Self::Spawns => raw.spawns = serde_json::from_str(text).map_err(parse_err)?,
        }

        Ok(())
    }
}
