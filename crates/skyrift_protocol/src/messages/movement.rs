//! Real-time movement payloads. These ride the UDP channel exclusively.

use prost::Message;

/// Client movement claim for one input sample.
///
/// The claimed position is a *request*; the server applies it only when the
/// implied displacement passes the speed cap.
#[derive(Clone, PartialEq, Message)]
pub struct MovementInput {
    #[prost(float, tag = "1")]
    pub dir_x: f32,
    #[prost(float, tag = "2")]
    pub dir_z: f32,
    #[prost(float, tag = "3")]
    pub x: f32,
    #[prost(float, tag = "4")]
    pub y: f32,
    #[prost(float, tag = "5")]
    pub z: f32,
    #[prost(float, tag = "6")]
    pub rotation: f32,
    #[prost(bool, tag = "7")]
    pub is_moving: bool,
    #[prost(bool, tag = "8")]
    pub is_flying: bool,
}

/// Server broadcast of a nearby entity's position.
#[derive(Clone, PartialEq, Message)]
pub struct PositionBroadcast {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(float, tag = "2")]
    pub x: f32,
    #[prost(float, tag = "3")]
    pub y: f32,
    #[prost(float, tag = "4")]
    pub z: f32,
    #[prost(float, tag = "5")]
    pub rotation: f32,
    #[prost(bool, tag = "6")]
    pub is_moving: bool,
    #[prost(bool, tag = "7")]
    pub is_flying: bool,
}

/// Authoritative snap-back after a rejected movement claim.
#[derive(Clone, PartialEq, Message)]
pub struct PositionCorrection {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub z: f32,
    #[prost(float, tag = "4")]
    pub rotation: f32,
}
