use crate::commands::{ProbeCommand, SetConfigCommand};
use crate::ledger::ConnectionState;
use crate::oob::FaultEvent;
use crate::parser::LINE_SIZE;
use crate::reconnect::{LinkState, ReassociationOutcome};
use crate::signal::WakeSignal;
use crate::tests::mock::{MockTimer, MockTransport};
use crate::urc::HardFaultReport;
use crate::wifi::{Adapter, ConfigurationError, DEFAULT_TIMEOUT_MS};
use alloc::string::String;
use atat::Error as AtError;
use core::fmt::Write;
use core::str::FromStr;
use embedded_nal::Ipv4Addr;

type AdapterType<'a> = Adapter<'a, MockTransport<'a>, MockTimer, 1_000_000, 4096>;

fn adapter<'a>(transport: MockTransport<'a>, wake: &'a WakeSignal) -> AdapterType<'a> {
    Adapter::new(transport, MockTimer::expiring(), wake)
}

/// Binds the module id to the next free slot
fn bind(adapter: &mut AdapterType, module_id: u8) -> usize {
    let slot = adapter.session.ledger.allocate().unwrap();
    adapter.session.ledger.bind(slot, module_id);
    slot
}

#[test]
fn test_send_command_ok() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT+S.SCFG=wifi_mode,1", "\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&SetConfigCommand::wifi_mode(1)).unwrap();

    adapter.transport.assert_script_done();
    assert_eq!(0, adapter.transport.unread());
}

#[test]
fn test_send_command_error_line() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT+S.SCFG=wifi_mode,1", "ERROR: Command not found\r\n");

    let mut adapter = adapter(transport, &wake);
    let result = adapter.send_command(&SetConfigCommand::wifi_mode(1)).unwrap_err();

    assert_eq!(ConfigurationError::CommandFailed("wifi_mode", AtError::Error), result);
}

#[test]
fn test_send_command_timeout() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT+S.SCFG=wifi_mode,1", "");

    let mut adapter = adapter(transport, &wake);
    let result = adapter.send_command(&SetConfigCommand::wifi_mode(1)).unwrap_err();

    assert_eq!(ConfigurationError::CommandFailed("wifi_mode", AtError::Timeout), result);
}

#[test]
fn test_await_skips_unknown_lines() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "+WIND:1:Poweron (140730)\r\nunknown\r\n\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&ProbeCommand).unwrap();
}

#[test]
fn test_await_truncates_long_lines() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();

    let mut reply: String = core::iter::repeat('x').take(LINE_SIZE * 2).collect();
    reply.push_str("\r\nOK\r\n");
    transport.expect_command("AT", &reply);

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&ProbeCommand).unwrap();
}

#[test]
fn test_await_skips_invalid_utf8() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect(b"AT\r", &[0xFF, 0xFE, b'\r', b'\n', b'O', b'K', b'\r', b'\n']);

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&ProbeCommand).unwrap();
}

#[test]
fn test_indication_dispatched_inside_await() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "+WIND:58:Socket Closed:2\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    let slot = bind(&mut adapter, 2);
    adapter.session.packets.enqueue(2, b"abc").unwrap();
    adapter.session.packets.enqueue(4, b"def").unwrap();

    adapter.send_command(&ProbeCommand).unwrap();

    assert!(!adapter.session.packets.has_packet(2));
    assert!(adapter.session.packets.has_packet(4));
    assert_eq!(ConnectionState::Closing, adapter.ledger().entry(slot).state);
    assert_eq!(None, adapter.ledger().resolve(2));
}

#[test]
fn test_socket_closed_unknown_id() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "+WIND:58:Socket Closed:7\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    let slot = bind(&mut adapter, 2);

    adapter.send_command(&ProbeCommand).unwrap();
    assert_eq!(ConnectionState::Connected, adapter.ledger().entry(slot).state);
}

#[test]
fn test_nested_indication_dispatch() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT+S.SCFG=wifi_mode,1", "+WIND:41:WiFi Disassociation: 8\r\n");
    transport.expect_command("AT+S.SCAN", "OK\r\n");
    transport.expect_command("AT+S.ROAM", "+WIND:58:Socket Closed:2\r\nOK\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    let slot = bind(&mut adapter, 2);

    adapter.send_command(&SetConfigCommand::wifi_mode(1)).unwrap();

    adapter.transport.assert_script_done();
    assert_eq!(ConnectionState::Closing, adapter.ledger().entry(slot).state);
    assert_eq!(Some(ReassociationOutcome::Skipped), adapter.last_reassociation());
    assert_eq!(LinkState::Reassociating, adapter.link_state());
    assert_eq!(0, adapter.session.reassociation_depth);
    assert_eq!(DEFAULT_TIMEOUT_MS, adapter.session.timeout_ms);
}

#[test]
fn test_pending_data_error() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "ERROR: Pending data\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&ProbeCommand).unwrap();

    assert_eq!(Some(FaultEvent::PendingDataError), adapter.take_fault());
    assert_eq!(None, adapter.take_fault());
}

#[test]
fn test_hard_fault_reinitializes() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command(
        "AT",
        "+WIND:8:Hard Fault:Console1: r0 00000001, r1 00000002, r2 00000003, r3 00000004, r12 00000005\r\nOK\r\n",
    );

    let mut adapter = adapter(transport, &wake);
    let slot = bind(&mut adapter, 2);
    adapter.session.ledger.set_pending_data(2, 10);
    adapter.session.packets.enqueue(2, b"abc").unwrap();
    adapter.session.link = LinkState::Associated;

    adapter.send_command(&ProbeCommand).unwrap();

    assert_eq!(
        Some(FaultEvent::HardFault(HardFaultReport {
            console: Some(1),
            registers: [1, 2, 3, 4, 5],
        })),
        adapter.take_fault()
    );
    assert!(adapter.packets().is_empty());
    assert_eq!(0, adapter.ledger().total());
    assert_eq!(ConnectionState::Closing, adapter.ledger().entry(slot).state);
    assert!(!adapter.is_connected());
}

#[test]
fn test_unsolicited_link_up() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "+WIND:24:WiFi Up:10.0.0.181\r\nOK\r\n");

    let mut adapter = adapter(transport, &wake);
    adapter.send_command(&ProbeCommand).unwrap();

    assert!(adapter.is_connected());
    assert_eq!(Some(Ipv4Addr::from_str("10.0.0.181").unwrap()), adapter.session.address);
}

#[test]
fn test_deferred_lines_replayed_first() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "OK\r\n");

    let mut adapter = adapter(transport, &wake);
    let slot = bind(&mut adapter, 2);

    let mut line = heapless::String::new();
    line.push_str("+WIND:58:Socket Closed:2").unwrap();
    adapter.defer_line(line);

    adapter.send_command(&ProbeCommand).unwrap();

    assert!(adapter.session.deferred.is_empty());
    assert_eq!(ConnectionState::Closing, adapter.ledger().entry(slot).state);
}

#[test]
fn test_deferred_lines_all_replayed_in_order() {
    let wake = WakeSignal::new();
    let mut transport = MockTransport::new();
    transport.expect_command("AT", "OK\r\n");

    let mut adapter = adapter(transport, &wake);
    let slots: alloc::vec::Vec<usize> = (0..8).map(|module_id| bind(&mut adapter, module_id)).collect();

    for module_id in 0..8 {
        let mut line = heapless::String::new();
        write!(line, "+WIND:58:Socket Closed:{}", module_id).unwrap();
        adapter.defer_line(line);
    }

    assert_eq!(8, adapter.session.deferred.len());
    assert_eq!(
        Some("+WIND:58:Socket Closed:0"),
        adapter.session.deferred.front().map(|line| line.as_str())
    );
    assert_eq!(
        Some("+WIND:58:Socket Closed:7"),
        adapter.session.deferred.back().map(|line| line.as_str())
    );

    adapter.send_command(&ProbeCommand).unwrap();

    assert!(adapter.session.deferred.is_empty());
    for slot in slots {
        assert_eq!(ConnectionState::Closing, adapter.ledger().entry(slot).state);
    }
}
