mod common;

use std::collections::BTreeSet;

use common::SimBus;
use onewire_bus::{Enumerator, OneWireError, OneWireSearch, RomId, SearchKind, SearchState};

fn search_all(bus: &mut SimBus, kind: SearchKind) -> Vec<RomId> {
    let mut state = SearchState::new();
    let mut found = Vec::new();
    loop {
        let mut search = OneWireSearch::new(bus, kind, &mut state);
        match search.next() {
            Ok(Some(rom)) => found.push(rom),
            Ok(None) => break,
            Err(e) => panic!("search failed: {e}"),
        }
    }
    found
}

#[test]
fn enumerates_every_device_exactly_once() {
    let devices = vec![
        SimBus::rom(0x10, [0x44, 0x00, 0x08, 0x00, 0x01, 0x02]),
        SimBus::rom(0x10, [0x45, 0x00, 0x08, 0x00, 0x01, 0x02]),
        SimBus::rom(0x28, [0xab, 0x89, 0x67, 0x45, 0x23, 0x01]),
        SimBus::rom(0x28, [0x00, 0x00, 0x00, 0x00, 0x00, 0x01]),
        SimBus::rom(0x3a, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
    ];
    let mut bus = SimBus::new(devices.clone());
    let mut state = SearchState::new();
    let mut found = Vec::new();
    loop {
        let mut search = OneWireSearch::new(&mut bus, SearchKind::Discover, &mut state);
        match search.next().unwrap() {
            Some(rom) => found.push(rom),
            None => break,
        }
    }
    assert!(state.is_done());
    let expect: BTreeSet<RomId> = devices.into_iter().collect();
    let got: BTreeSet<RomId> = found.iter().copied().collect();
    assert_eq!(found.len(), expect.len(), "each device exactly once");
    assert_eq!(got, expect);
    for rom in &found {
        assert!(rom.is_valid());
    }
}

#[test]
fn empty_search_reply_terminates_cleanly() {
    // Devices are present but none answers the alarm search: the first
    // slot pair samples 1/1 and the round ends with no CRC complaint.
    let mut bus = SimBus::new(vec![SimBus::rom(0x28, [1, 2, 3, 4, 5, 6])]);
    assert!(search_all(&mut bus, SearchKind::Alarm).is_empty());
}

#[test]
fn empty_bus_discovery_is_not_an_error() {
    let mut bus = SimBus::new(Vec::new());
    let mut enumerator = Enumerator::new();
    let diff = enumerator.discover(&mut bus).unwrap();
    assert!(diff.is_empty());
    assert!(enumerator.roster().present().is_empty());
}

#[test]
fn two_device_branch_walks_both_paths() {
    // Same family, serials differing first in ROM bit 9.
    let a = SimBus::rom(0x10, [0x02, 0x55, 0x00, 0x00, 0x00, 0x00]);
    let b = SimBus::rom(0x10, [0x03, 0x55, 0x00, 0x00, 0x00, 0x00]);
    let mut bus = SimBus::new(vec![a, b]);

    let mut state = SearchState::new();
    let first = OneWireSearch::new(&mut bus, SearchKind::Discover, &mut state)
        .next()
        .unwrap();
    assert_eq!(first, Some(a), "zero branch first");
    assert_eq!(state.last_discrepancy(), 9);

    let second = OneWireSearch::new(&mut bus, SearchKind::Discover, &mut state)
        .next()
        .unwrap();
    assert_eq!(second, Some(b));
    assert_eq!(state.last_discrepancy(), 0);
    assert!(state.is_done());

    let third = OneWireSearch::new(&mut bus, SearchKind::Discover, &mut state)
        .next()
        .unwrap();
    assert_eq!(third, None);
}

#[test]
fn alarmed_is_subset_of_present() {
    let all = vec![
        SimBus::rom(0x28, [1, 0, 0, 0, 0, 0]),
        SimBus::rom(0x28, [2, 0, 0, 0, 0, 0]),
        SimBus::rom(0x28, [3, 0, 0, 0, 0, 0]),
    ];
    let mut bus = SimBus::new(all.clone());
    bus.alarmed = vec![all[1]];

    let mut enumerator = Enumerator::new();
    enumerator.discover(&mut bus).unwrap();
    let alarmed = enumerator.alarm_scan(&mut bus).unwrap();

    let present: BTreeSet<RomId> = enumerator.roster().present().into_iter().collect();
    assert!(alarmed.iter().all(|rom| present.contains(rom)));
    assert_eq!(alarmed, vec![all[1]]);
}

#[test]
fn verify_is_fixed_point_of_discover() {
    let devices = vec![
        SimBus::rom(0x10, [0x44, 0, 0x08, 0, 1, 2]),
        SimBus::rom(0x28, [0xab, 0x89, 0x67, 0x45, 0x23, 0x01]),
    ];
    let mut bus = SimBus::new(devices.clone());
    let mut enumerator = Enumerator::new();
    enumerator.discover(&mut bus).unwrap();

    for rom in enumerator.roster().present() {
        assert!(enumerator.verify(&mut bus, rom).unwrap(), "{rom} verifies");
    }
    let absent = SimBus::rom(0x28, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x00]);
    assert!(!enumerator.verify(&mut bus, absent).unwrap());
}

#[test]
fn discover_seeds_family_counters() {
    let devices = vec![
        SimBus::rom(0x10, [1, 0, 0, 0, 0, 0]),
        SimBus::rom(0x10, [2, 0, 0, 0, 0, 0]),
        SimBus::rom(0x28, [3, 0, 0, 0, 0, 0]),
    ];
    let mut bus = SimBus::new(devices);
    let mut enumerator = Enumerator::new();
    enumerator.discover(&mut bus).unwrap();
    assert_eq!(enumerator.families().get(&0x10), Some(&2));
    assert_eq!(enumerator.families().get(&0x28), Some(&1));
}

#[test]
fn transport_failures_surface() {
    let mut bus = common::DeadBus;
    let mut enumerator = Enumerator::new();
    assert!(matches!(
        enumerator.discover(&mut bus),
        Err(OneWireError::TransportLost)
    ));
}
