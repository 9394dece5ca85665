#![doc = include_str!("../README.md")]

pub use skyrift_math as math;
pub use skyrift_network as network;
pub use skyrift_protocol as protocol;
pub use skyrift_registry as registry;
pub use skyrift_server as server;
pub use skyrift_spatial as spatial;

pub use skyrift_network::Network;
pub use skyrift_server::{GameLoop, GameState, InputQueue, ServerConfig};

#[cfg(test)]
mod tests;
