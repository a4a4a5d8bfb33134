//! End-to-end scenarios driven against a real `Session` over
//! loopback UDP. Reordered-delivery and SSRC-change scenarios are covered
//! exhaustively at the `JitterBuffer` unit level in `src/jitter.rs`; these
//! tests exercise the parts only visible through the full session: receive
//! dispatch, RTCP report construction, and DTMF packet pacing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use voxrtp::codec::rtcp::{self, RtcpPacket};
use voxrtp::codec::RtpPacket;
use voxrtp::payload::PT_PCMU;
use voxrtp::session::SessionOptions;
use voxrtp::{RtcpEvent, Session, UdpChannel};

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn raw_rtp(seq: u16, timestamp: u32, payload: Vec<u8>) -> Vec<u8> {
    RtpPacket {
        padding: false,
        extension: false,
        marker: seq == 0,
        payload_type: PT_PCMU,
        sequence_number: seq,
        timestamp,
        ssrc: 0xC0FFEE,
        csrc: vec![],
        extension_profile: None,
        extension_value: vec![],
        payload,
        padding_len: 0,
    }
    .serialize()
}

#[tokio::test]
async fn loopback_pcmu_fifty_frames_deliver_in_order() {
    let receiver_addr = addr(31000);
    let peer_addr = addr(31001);

    let session: Session<UdpChannel> = Session::create(
        receiver_addr,
        peer_addr,
        PT_PCMU,
        SessionOptions::default(),
    )
    .await
    .unwrap();

    let frames = Arc::new(Mutex::new(Vec::<(u32, usize)>::new()));
    let sink = frames.clone();
    session.on_audio(move |pcm, timestamp| {
        sink.lock().unwrap().push((timestamp, pcm.len()));
    });

    let peer = UdpSocket::bind(peer_addr).await.unwrap();
    for i in 0u16..50 {
        let packet = raw_rtp(i, i as u32 * 160, vec![0xFF; 160]);
        peer.send_to(&packet, receiver_addr).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 50);
    for (index, (timestamp, len)) in frames.iter().enumerate() {
        assert_eq!(*timestamp, index as u32 * 160);
        assert_eq!(*len, 320);
    }
}

#[tokio::test]
async fn reordered_delivery_still_drains_in_sequence_order() {
    let receiver_addr = addr(31010);
    let peer_addr = addr(31011);

    let options = SessionOptions {
        jitter_prefetch: 0,
        ..SessionOptions::default()
    };
    let session: Session<UdpChannel> =
        Session::create(receiver_addr, peer_addr, PT_PCMU, options)
            .await
            .unwrap();

    let timestamps = Arc::new(Mutex::new(Vec::<u32>::new()));
    let sink = timestamps.clone();
    session.on_audio(move |_pcm, timestamp| {
        sink.lock().unwrap().push(timestamp);
    });

    let peer = UdpSocket::bind(peer_addr).await.unwrap();
    for seq in [1u16, 3, 2, 4, 5] {
        let packet = raw_rtp(seq, seq as u32 * 160, vec![0xFF; 160]);
        peer.send_to(&packet, receiver_addr).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    let timestamps = timestamps.lock().unwrap();
    assert_eq!(*timestamps, vec![160, 320, 480, 640, 800]);
}

#[tokio::test]
async fn sequence_wrap_is_reflected_in_the_next_receiver_report() {
    let receiver_addr = addr(31020);
    let monitor_addr = addr(31021);

    let session: Session<UdpChannel> = Session::create(
        receiver_addr,
        monitor_addr,
        PT_PCMU,
        SessionOptions::default(),
    )
    .await
    .unwrap();

    let peer = UdpSocket::bind(addr(31022)).await.unwrap();
    for seq in [65534u16, 65535, 0, 1] {
        let packet = raw_rtp(seq, seq as u32, vec![0xFF; 160]);
        peer.send_to(&packet, receiver_addr).await.unwrap();
    }

    let monitor = UdpSocket::bind(monitor_addr).await.unwrap();
    let mut buf = vec![0u8; 2048];
    let extended = loop {
        let (size, _) = timeout(Duration::from_secs(2), monitor.recv_from(&mut buf))
            .await
            .expect("timed out waiting for RTCP report")
            .unwrap();

        let packets = rtcp::parse_compound(&buf[..size]).unwrap();
        let block = packets.iter().find_map(|p| match p {
            RtcpPacket::ReceiverReport(rr) => rr.reports.first(),
            RtcpPacket::SenderReport(sr) => sr.reports.first(),
            _ => None,
        });

        if let Some(block) = block {
            break block.extended_highest_sequence;
        }
    };

    assert_eq!(extended, 65537);
    let _ = session;
}

#[tokio::test]
async fn dtmf_digit_5_for_200ms_produces_the_expected_wire_packets() {
    let sender_addr = addr(31030);
    let receiver_addr = addr(31031);

    let session: Session<UdpChannel> = Session::create(
        sender_addr,
        receiver_addr,
        PT_PCMU,
        SessionOptions::default(),
    )
    .await
    .unwrap();

    let receiver = UdpSocket::bind(receiver_addr).await.unwrap();

    session.send_dtmf('5', 200, Some(1000)).await.unwrap();

    let mut buf = vec![0u8; 256];
    let mut packets = Vec::new();
    for _ in 0..13 {
        let (size, _) = timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .expect("timed out waiting for dtmf packet")
            .unwrap();
        packets.push(RtpPacket::parse(&buf[..size]).unwrap());
    }

    let non_end: Vec<_> = packets.iter().filter(|p| p.payload[1] & 0x80 == 0).collect();
    let end: Vec<_> = packets.iter().filter(|p| p.payload[1] & 0x80 != 0).collect();

    assert_eq!(non_end.len(), 10);
    assert_eq!(end.len(), 3);
    assert!(packets.iter().all(|p| p.timestamp == 1000));
    assert_eq!(packets[0].marker, true);
    assert!(packets[1..].iter().all(|p| !p.marker));
}

#[tokio::test]
async fn session_with_no_outbound_rtp_emits_receiver_report_with_sdes() {
    let local_addr = addr(31040);
    let monitor_addr = addr(31041);

    let options = SessionOptions {
        rtcp_bandwidth_bps: 16_000,
        ..SessionOptions::default()
    };
    let session: Session<UdpChannel> =
        Session::create(local_addr, monitor_addr, PT_PCMU, options)
            .await
            .unwrap();

    let events = Arc::new(Mutex::new(Vec::<RtcpEvent>::new()));
    let monitor = UdpSocket::bind(monitor_addr).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let (size, _) = timeout(Duration::from_secs(2), monitor.recv_from(&mut buf))
        .await
        .expect("timed out waiting for the first rtcp interval")
        .unwrap();

    let packets = rtcp::parse_compound(&buf[..size]).unwrap();
    assert!(matches!(packets[0], RtcpPacket::ReceiverReport(_)));
    assert!(packets.iter().any(|p| matches!(p, RtcpPacket::Sdes(_))));

    let _ = events;
    let _ = session;
}
