//! Cross-crate tests driving the full core: real tick loop, real
//! persistence workers over the in-memory collaborators, mock transports.

mod harness;

mod combat;
mod movement;
