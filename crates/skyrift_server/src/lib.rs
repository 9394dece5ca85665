#![doc = include_str!("../README.md")]

pub mod auth;
pub mod config;
pub mod entity;
pub mod game;
pub mod id;
pub mod persist;
pub mod queue;
pub mod session;
pub mod validate;
pub mod world;

pub use config::ServerConfig;
pub use game::broadcast::{DatagramSink, NullSink};
pub use game::{GameLoop, GameState};
pub use queue::{InputEvent, InputQueue, InputSender};
