use port_prowler_rs::scanner::{run_probe, tcp, udp};
use port_prowler_rs::types::{ProtocolKind, ScanState};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::time;

async fn unused_tcp_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn unused_udp_port() -> u16 {
    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    sock.local_addr().unwrap().port()
}

#[tokio::test]
async fn tcp_listener_is_open() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let r = tcp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
    assert_eq!(r.state, ScanState::Open);
    assert_eq!(r.protocol, ProtocolKind::Tcp);
    assert_eq!(r.port, port);
    assert_eq!(r.error, None);
    drop(listener);
}

#[tokio::test]
async fn tcp_refused_is_closed_without_error() {
    let port = unused_tcp_port().await;
    let r = tcp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
    assert_eq!(r.state, ScanState::Closed);
    assert_eq!(r.error, None);
}

/// Listener with a one-slot backlog that is never accepted. Once the accept
/// queue is full the kernel drops further SYNs without answering.
#[cfg(target_os = "linux")]
async fn saturated_listener() -> (TcpListener, u16, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind((Ipv4Addr::LOCALHOST, 0).into()).unwrap();
    let listener = socket.listen(1).unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut fillers = Vec::new();
    for _ in 0..8 {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => fillers.push(stream),
            _ => break,
        }
    }
    (listener, port, fillers)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn tcp_silent_peer_is_filtered_with_timeout() {
    let (_listener, port, _fillers) = saturated_listener().await;

    let start = Instant::now();
    let r = tcp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_millis(200)).await;
    assert_eq!(r.state, ScanState::Filtered);
    assert_eq!(r.error.as_deref(), Some("timeout"));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn udp_reply_is_open() {
    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        if let Ok((_, peer)) = sock.recv_from(&mut buf).await {
            let _ = sock.send_to(b"pong", peer).await;
        }
    });

    let r = udp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
    assert_eq!(r.state, ScanState::Open);
    assert_eq!(r.protocol, ProtocolKind::Udp);
    assert_eq!(r.error, None);
}

#[tokio::test]
async fn udp_silence_is_open_filtered() {
    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = sock.local_addr().unwrap().port();

    let r = udp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_millis(200)).await;
    assert_eq!(r.state, ScanState::OpenFiltered);
    assert_eq!(r.error.as_deref(), Some("timeout"));
    drop(sock);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn udp_port_unreachable_is_closed() {
    let port = unused_udp_port().await;
    let r = udp::probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
    assert_eq!(r.state, ScanState::Closed);
}

#[tokio::test]
async fn dispatch_by_protocol_tags_results() {
    let port = unused_tcp_port().await;
    let r = run_probe(ProtocolKind::Tcp, Ipv4Addr::LOCALHOST, port, Duration::from_secs(1)).await;
    assert_eq!(r.protocol, ProtocolKind::Tcp);

    let port = unused_udp_port().await;
    let r = run_probe(ProtocolKind::Udp, Ipv4Addr::LOCALHOST, port, Duration::from_millis(200)).await;
    assert_eq!(r.protocol, ProtocolKind::Udp);
}
