//! Half-open (SYN) probe over a raw IPv4/TCP transport.
//!
//! One SYN goes out; the first matching reply decides the state:
//! SYN+ACK is `open` (and is answered with a RST so the target does not keep
//! a half-open connection), RST is `closed`, silence until the deadline is
//! `filtered`. Callers must have passed the privilege gate first.

use crate::types::{PortResult, ProtocolKind, ScanState};
use std::net::Ipv4Addr;
use std::time::Duration;

pub const UNSUPPORTED: &str = "stealth scan not supported on this platform";

/// Flags of a candidate reply segment.
#[cfg_attr(not(unix), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TcpReply {
    pub syn: bool,
    pub ack: bool,
    pub rst: bool,
}

/// `None` means the segment says nothing about our probe; keep listening.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn classify_reply(reply: TcpReply) -> Option<ScanState> {
    if reply.rst {
        Some(ScanState::Closed)
    } else if reply.syn && reply.ack {
        Some(ScanState::Open)
    } else {
        None
    }
}

#[cfg(unix)]
pub async fn probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> PortResult {
    // The raw transport is blocking; keep it off the async workers.
    match tokio::task::spawn_blocking(move || raw::syn_probe(ip, port, timeout)).await {
        Ok(res) => res,
        Err(e) => PortResult::new(ip, port, ProtocolKind::Stealth, ScanState::Filtered)
            .with_error(format!("stealth probe task failed: {e}")),
    }
}

#[cfg(not(unix))]
pub async fn probe(ip: Ipv4Addr, port: u16, _timeout: Duration) -> PortResult {
    PortResult::new(ip, port, ProtocolKind::Stealth, ScanState::Filtered).with_error(UNSUPPORTED)
}

#[cfg(unix)]
mod raw {
    use super::{classify_reply, TcpReply};
    use crate::types::{PortResult, ProtocolKind, ScanState};
    use pnet::packet::ip::IpNextHeaderProtocols;
    use pnet::packet::tcp::{ipv4_checksum, MutableTcpPacket, TcpFlags, TcpPacket};
    use pnet::transport::{
        tcp_packet_iter, transport_channel, TransportChannelType::Layer4,
        TransportProtocol::Ipv4, TransportSender,
    };
    use rand::Rng;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};
    use std::time::{Duration, Instant};
    use tracing::debug;

    const TCP_HEADER_LEN: usize = 20;
    const CHANNEL_BUF: usize = 4096;
    const SYN_WINDOW: u16 = 64_240;
    const EPHEMERAL_PORTS: std::ops::RangeInclusive<u16> = 49_152..=65_535;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Segment {
        Syn,
        Rst,
    }

    pub(crate) fn syn_probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> PortResult {
        let mut res = PortResult::new(ip, port, ProtocolKind::Stealth, ScanState::Filtered);
        match exchange(ip, port, timeout) {
            Ok(Some((state, rtt))) => {
                res.state = state;
                res.rtt_ms = rtt.as_millis() as u64;
            }
            Ok(None) => res.error = Some("timeout".into()),
            Err(e) => res.error = Some(e.to_string()),
        }
        debug!(%ip, port, state = %res.state, rtt_ms = res.rtt_ms, error = ?res.error, "stealth probe");
        res
    }

    fn exchange(ip: Ipv4Addr, port: u16, timeout: Duration) -> io::Result<Option<(ScanState, Duration)>> {
        let src_ip = local_ipv4_for(ip)?;
        let (mut tx, mut rx) =
            transport_channel(CHANNEL_BUF, Layer4(Ipv4(IpNextHeaderProtocols::Tcp)))?;

        let mut rng = rand::thread_rng();
        let src_port = rng.gen_range(EPHEMERAL_PORTS);
        let isn: u32 = rng.gen();

        let syn = build_segment(src_ip, ip, src_port, port, isn, Segment::Syn);
        let start = Instant::now();
        send(&mut tx, &syn, ip)?;

        let deadline = start + timeout;
        let mut replies = tcp_packet_iter(&mut rx);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some((tcp, from)) = replies.next_with_timeout(remaining)? else {
                return Ok(None);
            };
            if from != IpAddr::V4(ip)
                || tcp.get_source() != port
                || tcp.get_destination() != src_port
            {
                continue;
            }
            let flags = tcp.get_flags();
            let reply = TcpReply {
                syn: flags & TcpFlags::SYN != 0,
                ack: flags & TcpFlags::ACK != 0,
                rst: flags & TcpFlags::RST != 0,
            };
            if reply.ack && tcp.get_acknowledgement() != isn.wrapping_add(1) {
                continue;
            }
            let Some(state) = classify_reply(reply) else {
                continue;
            };
            let rtt = start.elapsed();

            if state == ScanState::Open {
                let rst = build_segment(src_ip, ip, src_port, port, isn.wrapping_add(1), Segment::Rst);
                if let Err(e) = send(&mut tx, &rst, ip) {
                    debug!(%ip, port, error = %e, "failed to reset half-open connection");
                }
            }
            return Ok(Some((state, rtt)));
        }
    }

    fn send(tx: &mut TransportSender, segment: &[u8], dst: Ipv4Addr) -> io::Result<()> {
        let packet = TcpPacket::new(segment)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short tcp segment"))?;
        tx.send_to(packet, IpAddr::V4(dst))?;
        Ok(())
    }

    /// Source address the kernel would route `dst` from. Connecting a
    /// datagram socket only consults the routing table; nothing is sent.
    fn local_ipv4_for(dst: Ipv4Addr) -> io::Result<Ipv4Addr> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sock.connect((dst, 9))?;
        match sock.local_addr()?.ip() {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no IPv4 source address for target",
            )),
        }
    }

    pub(crate) fn build_segment(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        seq: u32,
        kind: Segment,
    ) -> Vec<u8> {
        let mut buf = vec![0u8; TCP_HEADER_LEN];
        if let Some(mut tcp) = MutableTcpPacket::new(&mut buf) {
            tcp.set_source(src_port);
            tcp.set_destination(dst_port);
            tcp.set_sequence(seq);
            tcp.set_acknowledgement(0);
            tcp.set_data_offset(5);
            match kind {
                Segment::Syn => {
                    tcp.set_flags(TcpFlags::SYN);
                    tcp.set_window(SYN_WINDOW);
                }
                Segment::Rst => {
                    tcp.set_flags(TcpFlags::RST);
                    tcp.set_window(0);
                }
            }
            tcp.set_urgent_ptr(0);
            let checksum = ipv4_checksum(&tcp.to_immutable(), &src, &dst);
            tcp.set_checksum(checksum);
        }
        buf
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_state_machine() {
        let syn_ack = TcpReply { syn: true, ack: true, rst: false };
        let rst_ack = TcpReply { syn: false, ack: true, rst: true };
        let bare_rst = TcpReply { rst: true, ..Default::default() };
        let bare_ack = TcpReply { ack: true, ..Default::default() };

        assert_eq!(classify_reply(syn_ack), Some(ScanState::Open));
        assert_eq!(classify_reply(rst_ack), Some(ScanState::Closed));
        assert_eq!(classify_reply(bare_rst), Some(ScanState::Closed));
        assert_eq!(classify_reply(bare_ack), None);
        assert_eq!(classify_reply(TcpReply::default()), None);
    }
}
