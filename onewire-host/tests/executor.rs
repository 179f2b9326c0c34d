mod common;

use std::time::Duration;

use common::{rom, TestMaster};
use onewire_bus::{OneWireError, Transaction};
use onewire_host::{AsyncExecutor, Completion, Request};

#[test]
fn concurrent_clients_serialize_onto_one_wire_order() {
    const CLIENTS: u8 = 3;
    const PER_CLIENT: u8 = 5;

    let (master, state) = TestMaster::new(vec![rom(0x28, [1, 2, 3, 4, 5, 6])]);
    state.lock().unwrap().block_stall = Duration::from_millis(2);
    let mut executor = AsyncExecutor::spawn(master);

    let mut workers = Vec::new();
    for client in 0..CLIENTS {
        let handle = executor.handle();
        workers.push(std::thread::spawn(move || {
            for seq in 0..PER_CLIENT {
                let txn = Transaction::new(None)
                    .with_write([client, seq])
                    .with_context(u64::from(client) << 8 | u64::from(seq));
                handle.submit(Request::Execute(txn)).unwrap();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let mut completion_order = Vec::new();
    for _ in 0..CLIENTS as usize * PER_CLIENT as usize {
        match executor.wait(Duration::from_secs(5)) {
            Some(Completion::Executed(done)) => {
                completion_order.push((done.write[0], done.write[1]));
                assert_eq!(
                    done.context,
                    u64::from(done.write[0]) << 8 | u64::from(done.write[1])
                );
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }
    executor.shutdown();

    // The wire saw whole transactions, one at a time: every frame is a
    // complete skip-ROM write, and the completion order equals the wire
    // order exactly.
    let state = state.lock().unwrap();
    let wire_order: Vec<(u8, u8)> = state
        .wire
        .iter()
        .map(|frame| {
            assert_eq!(frame[0], 0xcc);
            assert_eq!(frame.len(), 3);
            (frame[1], frame[2])
        })
        .collect();
    assert_eq!(wire_order, completion_order);

    // FIFO per submitting client.
    for client in 0..CLIENTS {
        let seqs: Vec<u8> = wire_order
            .iter()
            .filter(|(c, _)| *c == client)
            .map(|(_, s)| *s)
            .collect();
        let expect: Vec<u8> = (0..PER_CLIENT).collect();
        assert_eq!(seqs, expect, "client {client} stayed in order");
    }
}

#[test]
fn timeout_forces_a_resynchronizing_reset() {
    let (master, state) = TestMaster::new(vec![rom(0x28, [1, 2, 3, 4, 5, 6])]);
    state.lock().unwrap().fail_next_block = Some(OneWireError::Timeout);
    let mut executor = AsyncExecutor::spawn(master);

    executor
        .submit(Request::Execute(Transaction::new(None).with_write([0x44])))
        .unwrap();
    match executor.wait(Duration::from_secs(5)) {
        Some(Completion::Failed { operation, error }) => {
            assert_eq!(operation, "execute");
            assert!(matches!(error, OneWireError::Timeout));
        }
        other => panic!("unexpected completion: {other:?}"),
    }
    let resets_after_failure = state.lock().unwrap().resets;

    // The next request begins with a forced reset on top of its own.
    executor.submit(Request::Reset).unwrap();
    match executor.wait(Duration::from_secs(5)) {
        Some(Completion::ResetDone(outcome)) => assert!(outcome.presence),
        other => panic!("unexpected completion: {other:?}"),
    }
    assert_eq!(state.lock().unwrap().resets, resets_after_failure + 2);
    executor.shutdown();
}

#[test]
fn shutdown_cancels_later_submissions() {
    let (master, _state) = TestMaster::new(Vec::new());
    let executor = AsyncExecutor::spawn(master);
    let handle = executor.handle();
    executor.shutdown();
    assert!(matches!(
        handle.submit(Request::Discover),
        Err(OneWireError::Cancelled)
    ));
}

#[test]
fn discover_reports_roster_and_diff() {
    let a = rom(0x10, [1, 0, 0, 0, 0, 0]);
    let b = rom(0x28, [2, 0, 0, 0, 0, 0]);
    let (master, _state) = TestMaster::new(vec![a, b]);
    let mut executor = AsyncExecutor::spawn(master);

    executor.submit(Request::Discover).unwrap();
    match executor.wait(Duration::from_secs(5)) {
        Some(Completion::Discovered { present, diff }) => {
            assert_eq!(present.len(), 2);
            assert!(present.contains(&a) && present.contains(&b));
            assert_eq!(diff.added.len(), 2);
            assert!(diff.removed.is_empty());
        }
        other => panic!("unexpected completion: {other:?}"),
    }
    executor.shutdown();
}
