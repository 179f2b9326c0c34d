mod common;

use common::{accelerator_reply, Script};
use onewire_bus::{
    crc8, BusLevel, OneWireError, OneWireMaster, OneWireSearch, OneWireStatus, RomId, SearchKind,
    SearchState,
};
use onewire_serial::Ds2480;

fn rom(family: u8, serial: [u8; 6]) -> RomId {
    let mut bytes = [0u8; 8];
    bytes[0] = family;
    bytes[1..7].copy_from_slice(&serial);
    bytes[7] = crc8(&bytes[..7]);
    RomId::from_bytes(bytes)
}

#[test]
fn reset_frames_and_masks() {
    let mut script = Script::new();
    script.reply_run(&[0b1100_1101]); // ack, presence code 01
    let mut master = Ds2480::new(script);
    let status = master.reset().unwrap();
    assert!(status.presence());
    assert!(!status.alarming());
    assert_eq!(master.into_transport().written, vec![0xe3, 0xc5]);
}

#[test]
fn alarming_presence_is_reported() {
    let mut script = Script::new();
    script.reply_run(&[0b1111_1110]); // ack, presence code 10
    let mut master = Ds2480::new(script);
    let status = master.reset().unwrap();
    assert!(status.presence());
    assert!(status.alarming());
}

#[test]
fn garbled_reset_earns_one_retry() {
    let mut script = Script::new();
    script.reply_run(&[0x3d]); // ack bits wrong
    script.reply_run(&[0xcd]);
    let mut master = Ds2480::new(script);
    assert!(master.reset().unwrap().presence());
    // Both attempts framed identically.
    assert_eq!(
        master.into_transport().written,
        vec![0xe3, 0xc5, 0xe3, 0xc5]
    );
}

#[test]
fn block_escapes_and_collects_echo() {
    let mut script = Script::new();
    script.reply_run(&[0x55, 0xe3]);
    let mut master = Ds2480::new(script);
    let mut data = [0x55, 0xe3];
    master.block(&mut data).unwrap();
    assert_eq!(data, [0x55, 0xe3]);
    // Data-mode switch, payload with the doubled escape byte.
    assert_eq!(master.into_transport().written, vec![0xe1, 0x55, 0xe3, 0xe3]);
}

#[test]
fn accelerated_search_round_trip() {
    let device = rom(0x28, [0xab, 0x89, 0x67, 0x45, 0x23, 0x01]);
    let mut script = Script::new();
    script.reply_run(&[0xcd]); // reset: presence
    script.reply_run(&[0xf0]); // search command echo
    script.reply_run(&accelerator_reply(device.bytes()));
    let mut master = Ds2480::new(script);

    let mut state = SearchState::new();
    let found = OneWireSearch::new(&mut master, SearchKind::Discover, &mut state)
        .next()
        .unwrap();
    assert_eq!(found, Some(device));
    assert!(state.is_done());

    let written = master.into_transport().written;
    // Reset, then `E1 F0 E3 B5`, then the 16 direction bytes bracketed
    // by data mode and accelerator-off.
    assert_eq!(&written[..2], &[0xe3, 0xc5]);
    assert_eq!(&written[2..6], &[0xe1, 0xf0, 0xe3, 0xb5]);
    assert_eq!(written[6], 0xe1);
    assert_eq!(&written[written.len() - 2..], &[0xe3, 0xa5]);
    assert_eq!(written.len(), 2 + 4 + 1 + 16 + 2);
}

#[test]
fn strong_pullup_level_sequence() {
    let mut script = Script::new();
    script.reply_run(&[0xed]); // masks to 0xec
    let mut master = Ds2480::new(script);
    master.set_level(BusLevel::StrongPullup).unwrap();
    assert_eq!(master.into_transport().written, vec![0xe3, 0x3f, 0xed]);
}

#[test]
fn normal_level_sequence_checks_every_reply() {
    let mut script = Script::new();
    script.reply_run(&[0xec, 0xfd]);
    let mut master = Ds2480::new(script);
    master.set_level(BusLevel::Normal).unwrap();
    assert_eq!(
        master.into_transport().written,
        vec![0xe3, 0xf1, 0xed, 0xf1]
    );

    let mut script = Script::new();
    script.reply_run(&[0xec, 0x00]); // second byte fails the mask
    let mut master = Ds2480::new(script);
    assert!(matches!(
        master.set_level(BusLevel::Normal),
        Err(OneWireError::ProtocolFraming(_))
    ));
}

#[test]
fn empty_accelerator_reply_finds_nothing() {
    let mut script = Script::new();
    script.reply_run(&[0xcd]);
    script.reply_run(&[0xec]);
    script.reply_run(&[0xff; 16]); // every slot sampled 1/1
    let mut master = Ds2480::new(script);

    let mut state = SearchState::new();
    let found = OneWireSearch::new(&mut master, SearchKind::Alarm, &mut state)
        .next()
        .unwrap();
    assert_eq!(found, None);
}
