//! Directory listing: host lines → tokenized BASIC program on the bus.
//!
//! The host sends each listing line already tokenized, line number
//! included. The device adds the two-byte link pointer in front of every
//! line and a zero byte after it, so the computer can LOAD the result as a
//! program. Lines are streamed one at a time; the whole listing is never held.

use tracing::{debug, trace, warn};

use super::resync;
use crate::buffer::ScratchBuffer;
use crate::bus::{IecBus, Masked};
use crate::error::{IecError, IecResult};
use crate::link::{verb, HostCodec, HostLink, ListingReply};

/// Load address of the listing program.
pub const LISTING_ORIGIN: u16 = 0x0101;

/// Link pointer bytes plus the line terminator, minus the line number the
/// host already counted in the line length.
const LINE_OVERHEAD: u16 = 3;

/// Result of a listing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingReport {
    /// Lines put on the bus.
    pub lines: u32,
    /// Link pointer of the last line sent.
    pub end_pointer: u16,
}

/// Send one BASIC line: link pointer, text, terminator.
///
/// Returns the updated link pointer.
pub fn send_line<B: IecBus + ?Sized>(bus: &mut B, text: &[u8], pointer: u16) -> IecResult<u16> {
    let next = pointer.wrapping_add(text.len() as u16 + LINE_OVERHEAD);
    let [lo, hi] = next.to_le_bytes();

    let mut accepted = bus.send(lo) && bus.send(hi);
    for &b in text {
        accepted = accepted && bus.send(b);
    }
    accepted = accepted && bus.send(0);

    if !accepted {
        return Err(IecError::BusRejected { sent: 0 });
    }
    Ok(next)
}

/// Stream a directory listing from the host onto the bus.
///
/// The program is always closed with a zero pair, the second byte carrying
/// EOI, even when the session aborts, so the computer's LOAD terminates.
pub fn send_listing<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
    origin: u16,
) -> IecResult<ListingReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let accepted = {
        let mut bus = Masked::new(&mut *bus);
        let [lo, hi] = origin.to_le_bytes();
        bus.send(lo) && bus.send(hi)
    };
    if !accepted {
        warn!(origin, "bus rejected the listing load address");
    }

    let mut report = ListingReport {
        lines: 0,
        end_pointer: origin,
    };
    let result = stream_lines(bus, link, buf, &mut report);

    let accepted = {
        let mut bus = Masked::new(&mut *bus);
        bus.send(0) && bus.send_eoi(0)
    };
    if !accepted {
        warn!(lines = report.lines, "bus rejected the end of the listing");
    }

    match result {
        Ok(()) => {
            debug!(lines = report.lines, "listing complete");
            Ok(report)
        }
        Err(e) => Err(resync(link, e)),
    }
}

fn stream_lines<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
    report: &mut ListingReport,
) -> IecResult<()>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let mut codec = HostCodec::new(link);
    loop {
        match codec.request_listing_line()? {
            ListingReply::Line(len) => {
                let line = buf.window(len as usize);
                codec.read_exact(line)?;
                trace!(len, "listing line");

                let mut bus = Masked::new(&mut *bus);
                report.end_pointer = send_line(&mut *bus, line, report.end_pointer)
                    .map_err(|_| IecError::BusRejected { sent: report.lines })?;
                report.lines += 1;
            }
            ListingReply::End(verb::LAST_LINE) => return Ok(()),
            ListingReply::End(other) => {
                warn!("Ending listing at char {other:#04X}");
                let dropped = codec.link().drain()?;
                if dropped > 0 {
                    warn!(dropped, "discarded trailing listing bytes");
                }
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HeadlessBus;
    use crate::link::MemoryLink;

    fn host_lines(lines: &[&[u8]]) -> Vec<u8> {
        let mut host = Vec::new();
        for line in lines {
            host.push(b'L');
            host.push(line.len() as u8);
            host.extend_from_slice(line);
        }
        host.extend([b'l', 0]);
        host
    }

    #[test]
    fn test_send_line_pointer() {
        let mut bus = HeadlessBus::new(8);
        let next = send_line(&mut bus, b"ABCDE", 0x0101).unwrap();
        assert_eq!(next, 0x0109);
        assert_eq!(
            bus.sent_values(),
            vec![0x09, 0x01, b'A', b'B', b'C', b'D', b'E', 0]
        );
    }

    #[test]
    fn test_empty_listing() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::with_input(&host_lines(&[]));
        let mut buf = ScratchBuffer::new();

        let report = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN).unwrap();
        assert_eq!(report.lines, 0);
        assert_eq!(bus.sent_values(), vec![0x01, 0x01, 0, 0]);
        assert_eq!(bus.eoi_count(), 1);
        assert!(bus.sent()[3].eoi);
        assert_eq!(link.output(), b"L");
    }

    #[test]
    fn test_two_lines() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::with_input(&host_lines(&[&b"12345"[..], &b"abcdefg"[..]]));
        let mut buf = ScratchBuffer::new();

        let report = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN).unwrap();
        assert_eq!(report.lines, 2);
        assert_eq!(report.end_pointer, 0x0101 + 8 + 10);

        let sent = bus.sent_values();
        assert_eq!(&sent[2..4], &[0x09, 0x01]);
        // Second pointer follows the first line's pointer, text and terminator.
        assert_eq!(&sent[10..12], &[0x13, 0x01]);
        assert_eq!(&sent[sent.len() - 2..], &[0, 0]);
        assert_eq!(bus.eoi_count(), 1);
        assert_eq!(link.output(), b"LLL");
    }

    #[test]
    fn test_short_line_aborts_but_terminates() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::with_input(&[b'L', 9, b'x', b'y']);
        let mut buf = ScratchBuffer::new();

        let result = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN);
        assert!(matches!(
            result,
            Err(IecError::ShortRead {
                expected: 9,
                actual: 2
            })
        ));
        assert_eq!(bus.sent_values(), vec![0x01, 0x01, 0, 0]);
        assert!(bus.sent().last().unwrap().eoi);
    }

    #[test]
    fn test_missing_header_terminates() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::new();
        let mut buf = ScratchBuffer::new();

        let result = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN);
        assert!(result.is_err());
        assert_eq!(bus.sent_values(), vec![0x01, 0x01, 0, 0]);
    }

    #[test]
    fn test_unexpected_end_tag_drains() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::with_input(b"L\x02ABX\x00garbage");
        let mut buf = ScratchBuffer::new();

        let report = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN).unwrap();
        assert_eq!(report.lines, 1);
        assert_eq!(link.pending(), 0);
        assert_eq!(bus.eoi_count(), 1);
    }

    #[test]
    fn test_rejected_framing_bytes_do_not_abort() {
        let mut bus = HeadlessBus::new(8);
        bus.reject_after(1);
        let mut link = MemoryLink::with_input(&host_lines(&[]));
        let mut buf = ScratchBuffer::new();

        let report = send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN).unwrap();
        assert_eq!(report.lines, 0);
        assert_eq!(bus.sent_values(), vec![0x01]);
        assert_eq!(bus.eoi_count(), 0);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn test_masked_windows() {
        let mut bus = HeadlessBus::new(8);
        let mut link = MemoryLink::with_input(&host_lines(&[&b"AB"[..], &b"CDEF"[..]]));
        let mut buf = ScratchBuffer::new();

        send_listing(&mut bus, &mut link, &mut buf, LISTING_ORIGIN).unwrap();
        // Load address, two lines, closing pair.
        assert_eq!(bus.masked_windows(), 4);
        assert_eq!(bus.max_window_ops(), 2 + 4 + 1);
        assert_eq!(bus.unmasked_ops(), 0);
    }
}
