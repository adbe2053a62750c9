//! End-to-end scenarios against `SimStack`: both paths driven together.

use crate::config::SocketConfig;
use crate::layer::{SimPlatform, SocketLayer};
use ksock_core::abi::{AF_INET, IPPROTO_TCP, SOCK_STREAM};
use ksock_core::kprint::{set_log_level, LogLevel};
use ksock_core::{EventReply, Fd, Pid, ProtocolStack, SockAddrIn, SockError, StackErr};
use ksock_module::SimStack;
use std::net::Ipv4Addr;

fn quiet() {
    set_log_level(LogLevel::Off);
}

fn peer(n: u8) -> SockAddrIn {
    SockAddrIn::new(Ipv4Addr::new(10, 1, 0, n), 40000 + n as u16)
}

fn listener(l: &SocketLayer<SimPlatform>) -> Fd {
    let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
    l.bind(fd, SockAddrIn::any(8080)).unwrap();
    l.listen(fd, 4).unwrap();
    fd
}

fn connected(l: &SocketLayer<SimPlatform>) -> Fd {
    let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
    l.connect(fd, peer(200)).unwrap();
    let (id, ev) = l.stack().establish(l.pcb_of(fd).unwrap(), Ok(())).unwrap();
    l.dispatch(id, ev);
    assert_eq!(l.completions().try_take(Pid(1)), Some(0));
    fd
}

#[test]
fn backlog_fills_then_refuses_then_drains() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::new().backlog_capacity(4)).unwrap();
    let fd = listener(&l);
    let lpcb = l.pcb_of(fd).unwrap();

    let mut replies = Vec::new();
    for n in 1..=5 {
        let (id, ev) = l.stack().incoming(lpcb, peer(n)).unwrap();
        replies.push(l.dispatch(id, ev));
    }
    assert!(replies[..4].iter().all(EventReply::is_ok));
    assert!(matches!(replies[4], EventReply::Refused));
    assert_eq!(l.backlog_len(fd), 4);

    let mut peers = Vec::new();
    for _ in 0..4 {
        let (child, from) = l.accept(fd).unwrap();
        assert!(l.socket_of(child).is_some());
        peers.push(from);
    }
    assert_eq!(l.accept(fd), Err(SockError::RetryLater));
    peers.sort_by_key(|a| a.port);
    assert_eq!(peers, (1..=4).map(peer).collect::<Vec<_>>());
    assert_eq!(l.backlog_len(fd), 0);
}

#[test]
fn recv_backpressure_cycle() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::default()).unwrap();
    let fd = connected(&l);
    let pcb = l.pcb_of(fd).unwrap();
    let mut buf = [0u8; 16];

    assert_eq!(l.recv(fd, &mut buf), Err(SockError::RetryLater));
    let (id, ev) = l.stack().deliver(pcb, b"0123456789").unwrap();
    assert!(l.dispatch(id, ev).is_ok());

    assert_eq!(l.recv(fd, &mut buf[..4]), Ok(4));
    assert_eq!(&buf[..4], b"0123");
    assert_eq!(l.pending_len(fd), 6);
    assert_eq!(l.stack().released_chunks(), 0);

    assert_eq!(l.recv(fd, &mut buf[..6]), Ok(6));
    assert_eq!(&buf[..6], b"456789");
    assert_eq!(l.stack().released_chunks(), 1);
    assert_eq!(l.recv(fd, &mut buf), Err(SockError::RetryLater));
}

#[test]
fn every_accepted_byte_is_read_in_order() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::default()).unwrap();
    let fd = connected(&l);
    let pcb = l.pcb_of(fd).unwrap();

    let chunks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 3 + i as usize * 5]).collect();
    let mut queue: std::collections::VecDeque<_> = chunks.iter().map(|c| l.stack().chunk(c)).collect();
    let mut read = Vec::new();
    let mut buf = [0u8; 7];
    let mut refusals = 0;

    while let Some(chunk) = queue.pop_front() {
        let (id, ev) = l.stack().redeliver(pcb, chunk).unwrap();
        if let Some(back) = l.dispatch(id, ev).into_refused() {
            refusals += 1;
            queue.push_front(back);
        }
        if let Ok(n) = l.recv(fd, &mut buf) {
            read.extend_from_slice(&buf[..n]);
        }
    }
    while let Ok(n) = l.recv(fd, &mut buf) {
        read.extend_from_slice(&buf[..n]);
    }

    assert_eq!(read, chunks.concat());
    assert!(refusals > 0);
    assert_eq!(l.stack().credited(pcb), read.len());
}

#[test]
fn large_send_needs_several_calls() {
    quiet();
    let l = SocketLayer::simulated_with(SocketConfig::default(), SimStack::new().with_window(1000)).unwrap();
    let fd = connected(&l);
    let pcb = l.pcb_of(fd).unwrap();
    let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();

    let mut off = 0;
    let mut calls = 0;
    while off < data.len() {
        let window = l.stack().send_window(pcb);
        match l.send(fd, &data[off..], 0) {
            Ok(n) => {
                assert!(n <= window);
                off += n;
                calls += 1;
            }
            Err(SockError::RetryLater) => {
                let (id, ev) = l.stack().ack(pcb, 1000).unwrap();
                l.dispatch(id, ev);
            }
            Err(e) => panic!("send failed: {}", e),
        }
    }
    assert!(calls >= 5);
    assert_eq!(l.stack().written(pcb), data);
}

#[test]
fn closing_a_listener_releases_children() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::default()).unwrap();
    let fd = listener(&l);
    let lpcb = l.pcb_of(fd).unwrap();
    for n in 1..=3 {
        let (id, ev) = l.stack().incoming(lpcb, peer(n)).unwrap();
        l.dispatch(id, ev);
    }
    assert_eq!(l.live_sockets(), 4);

    l.close(fd).unwrap();
    assert_eq!(l.stack().closes(), 3 + 1);
    assert_eq!(l.stack().bad_closes(), 0);
    assert_eq!(l.live_sockets(), 0);
    assert_eq!(l.stack().live_pcbs(), 0);
}

#[test]
fn accepted_connection_outlives_listener() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::default()).unwrap();
    let fd = listener(&l);
    let (id, ev) = l.stack().incoming(l.pcb_of(fd).unwrap(), peer(1)).unwrap();
    l.dispatch(id, ev);
    let (child, _) = l.accept(fd).unwrap();
    l.close(fd).unwrap();

    let cpcb = l.pcb_of(child).unwrap();
    let (id, ev) = l.stack().deliver(cpcb, b"ping").unwrap();
    assert!(l.dispatch(id, ev).is_ok());
    let mut buf = [0u8; 4];
    assert_eq!(l.recv(child, &mut buf), Ok(4));
    assert_eq!(l.send(child, b"pong", 0), Ok(4));
    assert_eq!(l.stack().written(cpcb), b"pong");
}

#[test]
fn dead_connection_fails_fast_and_other_sockets_continue() {
    quiet();
    let l = SocketLayer::simulated(SocketConfig::default()).unwrap();
    let a = connected(&l);
    let b = connected(&l);
    let (id, ev) = l.stack().abort(l.pcb_of(a).unwrap(), StackErr::Rst).unwrap();
    assert_eq!(l.dispatch(id, ev).code(), Err(StackErr::Abrt));

    assert_eq!(l.send(a, b"x", 0), Err(SockError::InvalidArgument));
    assert_eq!(l.bind(a, SockAddrIn::any(1)), Err(SockError::InvalidArgument));
    assert_eq!(l.send(b, b"x", 0), Ok(1));
}
