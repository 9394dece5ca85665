/// The stable opcode space.
///
/// Values are grouped by the high byte: `0x00` auth lifecycle, `0x01`
/// real-time movement, `0x02` combat, `0x03` entity lifecycle, `0x04`
/// inventory and trade, `0x05` chat, `0x06` control, `0x07` zones and
/// channels. A numeric opcode may carry a request payload client→server and
/// a reply payload server→client.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u16)]
pub enum Opcode {
    Login = 0x0001,
    Register = 0x0003,
    CharacterList = 0x0005,
    CharacterSelect = 0x0006,
    EnterWorld = 0x0007,

    MovementInput = 0x0101,
    PositionBroadcast = 0x0102,
    PositionCorrection = 0x0103,

    SelectTarget = 0x0201,
    UseSkill = 0x0202,
    DamageEvent = 0x0203,
    EntityDeath = 0x0204,
    XpGain = 0x0205,
    AutoAttackToggle = 0x0206,

    EntitySpawn = 0x0301,
    EntityDespawn = 0x0302,
    EntityStats = 0x0303,

    Inventory = 0x0401,
    ItemMove = 0x0402,
    ItemEquip = 0x0403,
    ItemUnequip = 0x0404,
    VendorBuy = 0x0405,
    VendorSell = 0x0406,
    LootPickup = 0x0407,

    ChatSend = 0x0501,
    ChatBroadcast = 0x0502,

    Heartbeat = 0x0601,
    ServerMessage = 0x0602,
    ErrorResponse = 0x0603,

    ZoneChange = 0x0701,
    ChannelSwitch = 0x0702,
    ChannelList = 0x0703,
}

impl Opcode {
    /// Parses a raw wire value. Returns `None` for anything outside the
    /// reserved table; callers treat that as a protocol violation.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0x0001 => Self::Login,
            0x0003 => Self::Register,
            0x0005 => Self::CharacterList,
            0x0006 => Self::CharacterSelect,
            0x0007 => Self::EnterWorld,
            0x0101 => Self::MovementInput,
            0x0102 => Self::PositionBroadcast,
            0x0103 => Self::PositionCorrection,
            0x0201 => Self::SelectTarget,
            0x0202 => Self::UseSkill,
            0x0203 => Self::DamageEvent,
            0x0204 => Self::EntityDeath,
            0x0205 => Self::XpGain,
            0x0206 => Self::AutoAttackToggle,
            0x0301 => Self::EntitySpawn,
            0x0302 => Self::EntityDespawn,
            0x0303 => Self::EntityStats,
            0x0401 => Self::Inventory,
            0x0402 => Self::ItemMove,
            0x0403 => Self::ItemEquip,
            0x0404 => Self::ItemUnequip,
            0x0405 => Self::VendorBuy,
            0x0406 => Self::VendorSell,
            0x0407 => Self::LootPickup,
            0x0501 => Self::ChatSend,
            0x0502 => Self::ChatBroadcast,
            0x0601 => Self::Heartbeat,
            0x0602 => Self::ServerMessage,
            0x0603 => Self::ErrorResponse,
            0x0701 => Self::ZoneChange,
            0x0702 => Self::ChannelSwitch,
            0x0703 => Self::ChannelList,
            _ => return None,
        })
    }

    pub const fn to_raw(self) -> u16 {
        self as u16
    }

    /// True for opcodes that travel over the real-time UDP channel. All
    /// other opcodes are rejected when seen inside a datagram.
    pub const fn is_realtime(self) -> bool {
        matches!(
            self,
            Self::MovementInput | Self::PositionBroadcast | Self::PositionCorrection
        )
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, u16> {
        Self::from_raw(raw).ok_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip() {
        for raw in 0_u16..=0x0800 {
            if let Some(op) = Opcode::from_raw(raw) {
                assert_eq!(op.to_raw(), raw);
            }
        }
    }

    #[test]
    fn unknown_values_rejected() {
        assert_eq!(Opcode::from_raw(0x0000), None);
        assert_eq!(Opcode::from_raw(0x0104), None);
        assert_eq!(Opcode::from_raw(0xFFFF), None);
    }

    #[test]
    fn realtime_set_is_movement_only() {
        assert!(Opcode::MovementInput.is_realtime());
        assert!(Opcode::PositionCorrection.is_realtime());
        assert!(!Opcode::UseSkill.is_realtime());
        assert!(!Opcode::Heartbeat.is_realtime());
    }
}
