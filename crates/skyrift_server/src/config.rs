use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context};
use serde::Deserialize;

/// Runtime configuration for the world server.
///
/// Every field has a production-sensible default; a TOML file may override
/// any subset of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP listen address for the framed control channel.
    pub tcp_addr: SocketAddr,
    /// UDP bind address for the real-time channel.
    pub udp_addr: SocketAddr,
    /// Directory holding the game definition JSON files.
    pub data_dir: PathBuf,
    /// HS256 secret shared with the login service for JWT verification.
    pub jwt_secret: String,

    /// Tick loop frequency.
    pub tick_hz: u32,
    /// Global TCP connection cap.
    pub max_connections_total: usize,
    /// Per-source-IP TCP connection cap.
    pub max_connections_per_ip: usize,
    /// UDP rate gate, packets per second per source IP.
    pub udp_max_packets_per_ip_per_sec: u32,
    /// Idle close before authentication, seconds.
    pub preauth_idle_sec: u64,
    /// Idle close after authentication, seconds.
    pub postauth_idle_sec: u64,
    /// Heartbeat silence before forced disconnect, seconds.
    pub heartbeat_timeout_sec: u64,
    /// Players per channel before a new channel is appended.
    pub channel_capacity: usize,
    /// World units per spatial grid cell.
    pub spatial_cell_size: f32,
    /// Dirty-flush cadence RAM → cache, seconds.
    pub ram_to_cache_sec: u64,
    /// Dirty-flush cadence cache → durable store, seconds.
    pub cache_to_store_sec: u64,
    /// Minimum interval between zone changes, seconds.
    pub zone_change_cooldown_sec: u64,
    /// Minimum interval between channel switches, seconds.
    pub channel_switch_cooldown_sec: u64,
    /// Exclusive loot pickup window for the killer, seconds.
    pub loot_ownership_sec: u64,
    /// Maximum distance for vendor interactions, world units.
    pub npc_interact_range: f32,
    /// Input queue watermark; events beyond this are dropped and logged.
    pub input_queue_cap: usize,
    /// Malformed frames per minute a session survives.
    pub malformed_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            udp_addr: SocketAddr::from(([0, 0, 0, 0], 7778)),
            data_dir: PathBuf::from("data"),
            jwt_secret: String::new(),
            tick_hz: 20,
            max_connections_total: 10_000,
            max_connections_per_ip: 5,
            udp_max_packets_per_ip_per_sec: 100,
            preauth_idle_sec: 30,
            postauth_idle_sec: 300,
            heartbeat_timeout_sec: 15,
            channel_capacity: 1000,
            spatial_cell_size: 50.0,
            ram_to_cache_sec: 60,
            cache_to_store_sec: 300,
            zone_change_cooldown_sec: 3,
            channel_switch_cooldown_sec: 5,
            loot_ownership_sec: 30,
            npc_interact_range: 10.0,
            input_queue_cap: 65_536,
            malformed_per_minute: 50,
        }
    }
}

impl ServerConfig {
    /// Loads overrides from a TOML file on top of the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.tick_hz > 0, "tick rate must be greater than zero");
        ensure!(
            self.channel_capacity > 0,
            "channel capacity must be greater than zero"
        );
        ensure!(
            self.spatial_cell_size > 0.0,
            "spatial cell size must be positive"
        );
        ensure!(
            self.max_connections_per_ip <= self.max_connections_total,
            "per-IP connection cap cannot exceed the global cap"
        );
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.tick_hz).recip())
    }

    /// Tick duration in milliseconds, the `dt` used by movement and AI.
    pub fn tick_ms(&self) -> u64 {
        1000 / u64::from(self.tick_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.tick_ms(), 50);
    }

    #[test]
    fn toml_overrides_subset() {
        let config: ServerConfig = toml::from_str(
            r#"
            tick_hz = 10
            channel_capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_hz, 10);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.max_connections_per_ip, 5, "default survives");
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<ServerConfig>("tick_rate = 20").is_err());
    }
}
