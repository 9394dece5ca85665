//! Zone and channel payloads.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct ZoneChange {
    #[prost(uint32, tag = "1")]
    pub zone_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelSwitch {
    #[prost(uint32, tag = "1")]
    pub channel_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelListRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelInfo {
    #[prost(uint32, tag = "1")]
    pub channel_id: u32,
    #[prost(uint32, tag = "2")]
    pub population: u32,
    #[prost(uint32, tag = "3")]
    pub capacity: u32,
}

/// Channel roster for the requesting player's current zone.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelList {
    #[prost(uint32, tag = "1")]
    pub zone_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub channels: Vec<ChannelInfo>,
}
