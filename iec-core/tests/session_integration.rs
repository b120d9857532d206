//! End-to-end bus sessions against a scripted host.

use iec_core::{
    AtnCheck, CloseOutcome, ExchangePhase, HeadlessBus, IecBus, Interface, MemoryLink, OpenState,
    PipelineReport,
};

fn interface() -> Interface<HeadlessBus, MemoryLink> {
    Interface::new(HeadlessBus::new(8), MemoryLink::new())
}

/// Poll until the bus has no more queued attention events.
fn run_session(iface: &mut Interface<HeadlessBus, MemoryLink>) -> Vec<AtnCheck> {
    let mut checks = Vec::new();
    while iface.bus().pending_attention() > 0 {
        checks.push(iface.handler());
    }
    checks
}

#[test]
fn test_load_program() {
    let mut iface = interface();
    let mut host = b">\x02\rS\x00\x0aE\x0a".to_vec();
    host.extend(1..=10u8);
    iface.link_mut().queue_input(&host);

    iface.bus_mut().queue_open(0, b"GAME");
    iface.bus_mut().queue_talk(0);
    let checks = run_session(&mut iface);
    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdTalk]);

    let bus = iface.bus();
    assert_eq!(bus.sent_values(), (1..=10u8).collect::<Vec<_>>());
    assert_eq!(bus.sent().iter().filter(|b| !b.eoi).count(), 9);
    assert!(bus.sent()[9].eoi);

    match iface.last_report() {
        Some(PipelineReport::FileSent(report)) => {
            assert_eq!(report.total_size, 10);
            assert_eq!(report.bytes_sent, 10);
        }
        other => panic!("unexpected report: {:?}", other),
    }
    assert_eq!(iface.open_state(), OpenState::File);

    let mut expected = vec![b'i', 7, 0];
    expected.extend_from_slice(b"GAME");
    expected.extend_from_slice(&[b'S', b'N', 0]);
    assert_eq!(iface.link().output(), expected.as_slice());
}

#[test]
fn test_load_directory() {
    let mut iface = interface();
    let mut host = b">\x03\r".to_vec();
    host.extend([b'L', 5]);
    host.extend_from_slice(b"\x00\x00ABC");
    host.extend([b'L', 7]);
    host.extend_from_slice(b"\x01\x00DEFGH");
    host.extend([b'l', 0]);
    iface.link_mut().queue_input(&host);

    iface.bus_mut().queue_open(0, b"$");
    iface.bus_mut().queue_talk(0);
    run_session(&mut iface);

    let sent = iface.bus().sent_values();
    // Load address.
    assert_eq!(&sent[..2], &[0x01, 0x01]);
    // First line: 0x0101 + 5 + 3.
    assert_eq!(&sent[2..4], &[0x09, 0x01]);
    assert_eq!(&sent[4..9], b"\x00\x00ABC");
    assert_eq!(sent[9], 0);
    // Second line: 0x0109 + 7 + 3.
    assert_eq!(&sent[10..12], &[0x13, 0x01]);
    assert_eq!(&sent[12..19], b"\x01\x00DEFGH");
    assert_eq!(sent[19], 0);
    // End of program.
    assert_eq!(&sent[20..], &[0, 0]);
    assert_eq!(iface.bus().eoi_count(), 1);
    assert!(iface.bus().sent().last().unwrap().eoi);

    assert_eq!(
        iface.last_report(),
        Some(&PipelineReport::Listing(iec_core::ListingReport {
            lines: 2,
            end_pointer: 0x0113
        }))
    );
}

#[test]
fn test_info_verdict_sends_listing() {
    let mut iface = interface();
    iface.link_mut().queue_input(b">\x01\rl\x00");
    iface.bus_mut().queue_talk(0);
    run_session(&mut iface);
    assert_eq!(iface.bus().sent_values(), vec![0x01, 0x01, 0, 0]);
    assert_eq!(iface.open_state(), OpenState::Info);
}

#[test]
fn test_save_program() {
    let mut iface = interface();
    iface.link_mut().queue_input(b">\x00\r");
    iface.bus_mut().queue_incoming(b"\x01\x08PROGRAM", true);

    iface.bus_mut().queue_open(1, b"NEWFILE");
    iface.bus_mut().queue_listen(1);
    let checks = run_session(&mut iface);
    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdListen]);

    let output = iface.link().output();
    let frame_start = 3 + b"NEWFILE".len();
    assert_eq!(output[frame_start], b'W');
    assert_eq!(output[frame_start + 1] as usize, 2 + 9);
    assert_eq!(&output[frame_start + 2..], b"\x01\x08PROGRAM");
    assert_eq!(iface.queued_error(), 0);
}

#[test]
fn test_save_refused() {
    let mut iface = interface();
    iface.link_mut().queue_input(b">\x3F\r");
    iface.bus_mut().queue_incoming(b"DATA", true);

    iface.bus_mut().queue_open(1, b"EXISTING");
    iface.bus_mut().queue_listen(1);
    run_session(&mut iface);

    assert_eq!(iface.queued_error(), 0x3F);
    assert_eq!(iface.bus().pending_incoming(), 4);
    assert!(!iface.link().output().contains(&b'W'));
    assert_eq!(
        iface.last_report(),
        Some(&PipelineReport::SaveRejected(0x3F))
    );
}

#[test]
fn test_desync_recovery() {
    let mut iface = interface();
    // Size reply, then a header cut short, then stale bytes.
    iface
        .link_mut()
        .queue_input(b">\x02\rS\x00\x20E\x20abc");
    iface.bus_mut().queue_open(0, b"BROKEN");
    iface.bus_mut().queue_talk(0);
    run_session(&mut iface);

    assert!(matches!(
        iface.last_report(),
        Some(PipelineReport::Failed { desync: true, .. })
    ));
    assert_eq!(iface.link().pending(), 0);
    assert_eq!(iface.bus().eoi_count(), 0);

    // The next exchange starts cleanly on a frame boundary.
    iface.link_mut().take_output();
    iface.link_mut().queue_input(b"N\x06BROKEN");
    iface.bus_mut().queue_close(0);
    run_session(&mut iface);
    assert_eq!(iface.link().output(), b"C");
    assert_eq!(
        iface.last_report(),
        Some(&PipelineReport::Closed(CloseOutcome::Named {
            tag: b'N',
            name: "BROKEN".to_string()
        }))
    );
}

#[test]
fn test_close_with_name_keeps_state() {
    let mut iface = interface();
    iface.link_mut().queue_input(b">\x02\rS\x00\x01E\x01Z");
    iface.bus_mut().queue_open(0, b"Z");
    iface.bus_mut().queue_talk(0);
    run_session(&mut iface);
    assert_eq!(iface.open_state(), OpenState::File);

    iface.link_mut().queue_input(b"N\x01Z");
    iface.bus_mut().queue_close(0);
    run_session(&mut iface);

    assert_eq!(iface.open_state(), OpenState::File);
    assert_eq!(iface.bus().device_number(), 8);
}

#[test]
fn test_close_moves_device() {
    let mut iface = interface();
    iface.link_mut().queue_input(&[b'C', 8, b'C', 11]);
    iface.bus_mut().queue_close(0);
    iface.bus_mut().queue_close(0);

    iface.handler();
    assert_eq!(
        iface.last_report(),
        Some(&PipelineReport::Closed(CloseOutcome::DeviceUnchanged(8)))
    );
    iface.handler();
    assert_eq!(iface.bus().device_number(), 11);
}

#[test]
fn test_status_after_failed_save() {
    let mut iface = interface();
    // LISTEN verdict refuses the save; the following status read reports it.
    iface.link_mut().queue_input(b">\x1A\r");
    iface.bus_mut().queue_open(1, b"PROTECTED");
    iface.bus_mut().queue_listen(1);
    run_session(&mut iface);
    assert_eq!(iface.queued_error(), 0x1A);

    iface.link_mut().take_output();
    iface
        .link_mut()
        .queue_input(b">\x1A\r:26,WRITE PROTECT ON,00,00\r");
    iface.bus_mut().queue_talk(15);
    run_session(&mut iface);

    assert_eq!(
        iface.bus().sent_values(),
        b"26,WRITE PROTECT ON,00,00".to_vec()
    );
    assert_eq!(iface.queued_error(), 0);
    assert_eq!(iface.link().output(), &[b'i', 3, 15, b'E', 0x1A]);
}

#[test]
fn test_overlong_status_keeps_framing() {
    let mut iface = interface();
    let mut host = b">\x00\r:".to_vec();
    host.extend(std::iter::repeat(b'X').take(300));
    host.extend_from_slice(b"\rC\x09");
    iface.link_mut().queue_input(&host);

    iface.bus_mut().queue_talk(15);
    iface.bus_mut().queue_close(0);
    run_session(&mut iface);

    assert_eq!(iface.bus().sent().len(), 256);
    assert!(iface.bus().sent()[255].eoi);
    assert_eq!(iface.link().pending(), 0);
    assert_eq!(iface.bus().device_number(), 9);
    assert_eq!(
        iface.last_report(),
        Some(&PipelineReport::Closed(CloseOutcome::DeviceChanged { from: 8, to: 9 }))
    );
}

#[test]
fn test_phase_tracks_open() {
    let mut iface = interface();
    iface.bus_mut().queue_open(3, b"X");
    iface.handler();
    assert_eq!(iface.phase(), ExchangePhase::AwaitingVerdict { channel: 3 });

    iface.link_mut().queue_input(b">\x00\r");
    iface.bus_mut().queue_talk(3);
    iface.handler();
    assert_eq!(iface.phase(), ExchangePhase::Idle);
}

#[test]
fn test_all_bus_io_is_masked() {
    let mut iface = interface();
    let mut host = b">\x02\rS\x00\x05E\x05".to_vec();
    host.extend_from_slice(b"HELLO");
    host.extend_from_slice(b">\x00\r");
    iface.link_mut().queue_input(&host);
    iface.bus_mut().queue_incoming(b"SAVED", true);

    iface.bus_mut().queue_open(0, b"HELLO");
    iface.bus_mut().queue_talk(0);
    iface.bus_mut().queue_open(1, b"SAVED");
    iface.bus_mut().queue_listen(1);
    run_session(&mut iface);

    assert_eq!(iface.bus().unmasked_ops(), 0);
    assert_eq!(iface.bus().max_window_ops(), 1);
}
