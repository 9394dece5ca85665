use approx::assert_relative_eq;
use prost::Message;
use skyrift_protocol::messages::movement::{MovementInput, PositionCorrection};
use skyrift_protocol::Opcode;

use super::harness::Harness;

fn claim(x: f32, z: f32) -> MovementInput {
    MovementInput {
        dir_x: 1.0,
        dir_z: 0.0,
        x,
        y: 0.0,
        z,
        rotation: 0.0,
        is_moving: true,
        is_flying: false,
    }
}

/// A teleport-sized claim produces one correction per attempt and never
/// moves the authoritative position.
#[tokio::test]
async fn speed_hack_is_rejected_with_a_correction() {
    let mut harness = Harness::new().await;
    let mut player = harness.enter_world(1, 101, "Aria").await;
    harness.set_position(player.entity_id, 200.0, 0.0, 200.0);

    // Ten ticks of claiming a spot 10 units away. Ground speed allows
    // 6 · 0.05 · 1.2 = 0.36 units per tick.
    for _ in 0..10 {
        let seq = player.next_seq();
        assert!(harness.send_datagram(&player, seq, Opcode::MovementInput, &claim(210.0, 200.0)));
        harness.tick();
    }

    assert_eq!(harness.udp.count_of(Opcode::PositionCorrection), 10);

    let state = harness.state();
    let position = state.world.player(player.entity_id).unwrap().position;
    assert_eq!(position.x, 200.0);
    assert_eq!(position.z, 200.0);

    // The correction carries the authoritative position.
    let corrections = harness.udp.datagrams();
    let (_, _, payload) = corrections
        .iter()
        .find(|(_, raw, _)| *raw == Opcode::PositionCorrection.to_raw())
        .unwrap();
    let correction = PositionCorrection::decode(&payload[..]).unwrap();
    assert_eq!(correction.x, 200.0);
    assert_eq!(correction.z, 200.0);
}

#[tokio::test]
async fn legal_claims_are_applied() {
    let mut harness = Harness::new().await;
    let mut player = harness.enter_world(1, 101, "Aria").await;
    harness.set_position(player.entity_id, 200.0, 0.0, 200.0);

    let seq = player.next_seq();
    assert!(harness.send_datagram(&player, seq, Opcode::MovementInput, &claim(200.3, 200.0)));
    harness.tick();

    assert_eq!(harness.udp.count_of(Opcode::PositionCorrection), 0);
    let position = harness.state().world.player(player.entity_id).unwrap().position;
    assert_relative_eq!(position.x, 200.3);
}

#[tokio::test]
async fn out_of_bounds_claims_are_rejected() {
    let mut harness = Harness::new().await;
    let mut player = harness.enter_world(1, 101, "Aria").await;

    // The meadow's half-extent is 1000.
    harness.set_position(player.entity_id, 999.9, 0.0, 0.0);
    let seq = player.next_seq();
    assert!(harness.send_datagram(&player, seq, Opcode::MovementInput, &claim(1000.2, 0.0)));
    harness.tick();

    assert_eq!(harness.udp.count_of(Opcode::PositionCorrection), 1);
    let position = harness.state().world.player(player.entity_id).unwrap().position;
    assert_eq!(position.x, 999.9);
}

/// Replaying an identical datagram is dropped at the sequence gate; the
/// movement applies exactly once.
#[tokio::test]
async fn replayed_datagrams_apply_once() {
    let mut harness = Harness::new().await;
    let mut player = harness.enter_world(1, 101, "Aria").await;
    harness.set_position(player.entity_id, 200.0, 0.0, 200.0);

    let seq = player.next_seq();
    let input = claim(200.3, 200.0);

    assert!(harness.send_datagram(&player, seq, Opcode::MovementInput, &input));
    // Same session, same sequence: the gate silently drops it.
    assert!(!harness.send_datagram(&player, seq, Opcode::MovementInput, &input));
    harness.tick();

    let position = harness.state().world.player(player.entity_id).unwrap().position;
    assert_relative_eq!(position.x, 200.3);
    assert_eq!(harness.udp.count_of(Opcode::PositionCorrection), 0);
}
