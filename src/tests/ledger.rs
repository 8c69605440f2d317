use crate::ledger::{ConnectionState, Ledger, SOCKET_COUNT};

/// Ledger with module ids 3 (slot 0) and 5 (slot 1) bound
fn bound_ledger() -> Ledger {
    let mut ledger = Ledger::new();

    for module_id in [3, 5] {
        let slot = ledger.allocate().unwrap();
        ledger.bind(slot, module_id);
    }

    ledger
}

fn assert_consistent(ledger: &Ledger) {
    let sum: u64 = ledger.entries().iter().map(|entry| entry.pending as u64).sum();
    assert_eq!(sum, ledger.total());
}

#[test]
fn test_set_pending_data_total_matches_sum() {
    let mut ledger = bound_ledger();
    assert!(!ledger.has_pending_data());

    assert!(ledger.set_pending_data(3, 10));
    assert_consistent(&ledger);
    assert!(ledger.set_pending_data(5, 20));
    assert_consistent(&ledger);
    assert_eq!(30, ledger.total());

    assert!(ledger.set_pending_data(3, 4));
    assert_consistent(&ledger);
    assert!(ledger.set_pending_data(5, 0));
    assert_consistent(&ledger);
    assert_eq!(4, ledger.total());
    assert!(ledger.has_pending_data());

    assert!(ledger.set_pending_data(3, 0));
    assert_consistent(&ledger);
    assert!(!ledger.has_pending_data());
}

#[test]
fn test_set_pending_data_unknown_socket() {
    let mut ledger = bound_ledger();
    ledger.set_pending_data(3, 10);

    assert!(!ledger.set_pending_data(7, 99));

    assert_eq!(10, ledger.pending(0));
    assert_eq!(0, ledger.pending(1));
    assert_eq!(10, ledger.total());
    assert_consistent(&ledger);
}

#[test]
fn test_resolve() {
    let ledger = bound_ledger();

    assert_eq!(Some(0), ledger.resolve(3));
    assert_eq!(Some(1), ledger.resolve(5));
    assert_eq!(None, ledger.resolve(0));
}

#[test]
fn test_allocate_exhausted() {
    let mut ledger = Ledger::new();

    for slot in 0..SOCKET_COUNT {
        assert_eq!(Some(slot), ledger.allocate());
        assert_eq!(ConnectionState::Open, ledger.entry(slot).state);
    }

    assert_eq!(None, ledger.allocate());
}

#[test]
fn test_unbind_keeps_slot_reserved() {
    let mut ledger = bound_ledger();
    ledger.set_pending_data(3, 10);
    ledger.set_pending_data(5, 2);

    ledger.unbind(0);

    let entry = ledger.entry(0);
    assert_eq!(ConnectionState::Closing, entry.state);
    assert_eq!(None, entry.module_id);
    assert_eq!(0, entry.pending);
    assert_eq!(2, ledger.total());
    assert_eq!(None, ledger.resolve(3));
    assert_consistent(&ledger);

    // Slot stays reserved
    assert_eq!(Some(2), ledger.allocate());
}

#[test]
fn test_unbind_all() {
    let mut ledger = bound_ledger();
    let open_slot = ledger.allocate().unwrap();
    ledger.set_pending_data(3, 10);
    ledger.set_pending_data(5, 2);

    ledger.unbind_all();

    assert_eq!(0, ledger.total());
    assert_eq!(ConnectionState::Closing, ledger.entry(0).state);
    assert_eq!(ConnectionState::Closing, ledger.entry(1).state);
    assert_eq!(ConnectionState::Open, ledger.entry(open_slot).state);
    assert!(ledger.entries().iter().all(|entry| entry.module_id.is_none()));
}

#[test]
fn test_release_frees_slot() {
    let mut ledger = bound_ledger();
    ledger.set_pending_data(3, 10);

    ledger.release(0);

    assert_eq!(ConnectionState::Closed, ledger.entry(0).state);
    assert_eq!(0, ledger.total());
    assert_eq!(Some(0), ledger.allocate());
}

#[test]
fn test_rebind_resets_pending() {
    let mut ledger = bound_ledger();
    ledger.set_pending_data(3, 10);

    ledger.bind(0, 4);

    assert_eq!(Some(0), ledger.resolve(4));
    assert_eq!(0, ledger.pending(0));
    assert_consistent(&ledger);
}
