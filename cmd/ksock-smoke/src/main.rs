//! KSOCK End-to-End Smoke Test
//!
//! Drives the socket layer against the in-memory stack through the
//! numbered syscall surface:
//!   Part A: Socket creation and validation
//!   Part B: Server side: bind, listen, backlog, accept
//!   Part C: Data path: receive backpressure, windowed send
//!   Part D: Connect completion, stack errors, teardown
//!
//! Run: ./target/release/ksock-smoke
//! (KSOCK_LOG_LEVEL=trace shows every event)

use ksock::{SimPlatform, SocketConfig, SocketLayer};
use ksock_core::abi::{nr, RawSockAddrIn, AF_INET, IPPROTO_TCP, IPPROTO_UDP, SOCKADDR_IN_LEN, SOCK_DGRAM, SOCK_STREAM};
use ksock_core::{kprint, EventReply, Fd, Pid, ProcessContext, ProtocolStack, SockAddrIn, StackErr};
use ksock_module::sim_stack::SimOp;
use ksock_module::SimStack;

use std::net::Ipv4Addr;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn expect(&mut self, name: &str, got: i64, want: i64) {
        self.check(name, got == want, &format!("expected {} got {}", want, got));
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

type Layer = SocketLayer<SimPlatform>;

fn neg(errno: i32) -> i64 {
    -(errno as i64)
}

fn peer(n: u8) -> SockAddrIn {
    SockAddrIn::new(Ipv4Addr::new(10, 9, 0, n), 50000 + n as u16)
}

fn raw_call(l: &Layer, number: u32, args: [u64; 6]) -> i64 {
    // SAFETY: every pointer argument below points at a live local.
    unsafe { l.syscall(number, args) }
}

/// A TCP socket connected to `remote`, completion already collected.
fn open_connected(l: &Layer, remote: SockAddrIn) -> Option<i32> {
    let fd = l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
    if fd < 0 || l.sys_connect(fd as i32, &remote.to_raw(), SOCKADDR_IN_LEN) != 0 {
        return None;
    }
    let pcb = l.pcb_of(Fd(fd as i32))?;
    let (id, ev) = l.stack().establish(pcb, Ok(()))?;
    l.dispatch(id, ev);
    l.completions().try_take(l.procs().current_pid())?;
    Some(fd as i32)
}

// ════════════════════════════════════════════════════════════
// Part A: Creation
// ════════════════════════════════════════════════════════════

fn test_create(t: &mut TestRunner) {
    t.section("Part A: Socket creation");
    let l = Layer::simulated(SocketConfig::default()).expect("layer");

    let tcp = l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
    t.check(&format!("socket(INET, STREAM, TCP) -> {}", tcp), tcp >= 0, "negative fd");

    let udp = raw_call(&l, nr::SOCKET, [AF_INET as u64, SOCK_DGRAM as u64, IPPROTO_UDP as u64, 0, 0, 0]);
    t.check(&format!("syscall(SOCKET, INET, DGRAM, UDP) -> {}", udp), udp >= 0, "negative fd");

    t.expect("socket(INET6, ...) -> -EINVAL",
        l.sys_socket(libc::AF_INET6, SOCK_STREAM, IPPROTO_TCP), neg(libc::EINVAL));
    t.expect("socket(INET, STREAM, UDP) -> -EINVAL",
        l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_UDP), neg(libc::EINVAL));
    t.expect("socket(INET, DGRAM, TCP) -> -EINVAL",
        l.sys_socket(AF_INET, SOCK_DGRAM, IPPROTO_TCP), neg(libc::EINVAL));

    let addr = SockAddrIn::any(53).to_raw();
    t.expect("bind(udp) -> -EINVAL", l.sys_bind(udp as i32, &addr, SOCKADDR_IN_LEN), neg(libc::EINVAL));
    t.expect("ioctl(any) -> 0", raw_call(&l, nr::IOCTL, [tcp as u64, 0x8927, 0, 0, 0, 0]), 0);
    t.expect("recvfrom -> -ENOSYS", raw_call(&l, nr::RECVFROM, [0; 6]), neg(libc::ENOSYS));

    t.expect("close(udp) -> 0", l.sys_close(udp as i32), 0);
    t.expect("close(tcp) -> 0", l.sys_close(tcp as i32), 0);
    t.expect("close(tcp) again -> -EBADF", l.sys_close(tcp as i32), neg(libc::EBADF));
    t.expect("no sockets left", l.live_sockets() as i64, 0);
}

// ════════════════════════════════════════════════════════════
// Part B: Server side
// ════════════════════════════════════════════════════════════

fn test_server(t: &mut TestRunner) {
    t.section("Part B: bind / listen / backlog / accept");
    let l = Layer::simulated(SocketConfig::new().backlog_capacity(4)).expect("layer");

    let fd = l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP) as i32;
    let addr = SockAddrIn::any(8080).to_raw();
    let addr_ptr = &addr as *const RawSockAddrIn as u64;
    t.expect("bind(0.0.0.0:8080) -> 0",
        raw_call(&l, nr::BIND, [fd as u64, addr_ptr, SOCKADDR_IN_LEN as u64, 0, 0, 0]), 0);
    t.expect("listen(4) -> 0", l.sys_listen(fd, 4), 0);
    t.check("socket is listening", l.is_listening(Fd(fd)), "not listening");
    t.expect("accept on empty backlog -> -EAGAIN", l.sys_accept(fd, None, None), neg(libc::EAGAIN));

    let lpcb = match l.pcb_of(Fd(fd)) {
        Some(p) => p,
        None => { t.fail("listening handle", "missing"); return; }
    };
    t.check("listener keeps 0.0.0.0:8080",
        l.stack().local_addr(lpcb) == Some(SockAddrIn::any(8080)),
        &format!("{:?}", l.stack().local_addr(lpcb)));
    let mut replies = Vec::new();
    for n in 1..=5 {
        if let Some((id, ev)) = l.stack().incoming(lpcb, peer(n)) {
            replies.push(l.dispatch(id, ev));
        }
    }
    let accepted = replies.iter().filter(|r| r.is_ok()).count();
    t.check("5 connections: 4 queued", accepted == 4, &format!("{} queued", accepted));
    t.check("5th refused as backlog-full",
        matches!(replies.last(), Some(EventReply::Refused)), "not refused");

    let mut fds = Vec::new();
    for i in 0..4 {
        let mut raw = RawSockAddrIn::default();
        let mut len = 0u32;
        let child = raw_call(&l, nr::ACCEPT, [
            fd as u64,
            &mut raw as *mut RawSockAddrIn as u64,
            &mut len as *mut u32 as u64,
            0, 0, 0,
        ]);
        let from = SockAddrIn::from_raw(&raw);
        t.check(&format!("accept #{} -> fd {} from {}", i + 1, child,
                from.map(|a| a.to_string()).unwrap_or_default()),
            child >= 0 && len == SOCKADDR_IN_LEN && from.is_some(),
            &format!("ret {} len {}", child, len));
        fds.push(child);
    }
    t.expect("5th accept -> -EAGAIN", l.sys_accept(fd, None, None), neg(libc::EAGAIN));

    for child in fds {
        l.sys_close(child as i32);
    }
    l.sys_close(fd);
    t.check("one stack close per control block",
        l.stack().closes() == 5 && l.stack().bad_closes() == 0,
        &format!("{} closes, {} on dead blocks", l.stack().closes(), l.stack().bad_closes()));
}

// ════════════════════════════════════════════════════════════
// Part C: Data path
// ════════════════════════════════════════════════════════════

fn test_data(t: &mut TestRunner) {
    t.section("Part C: receive backpressure and windowed send");
    let l = Layer::simulated_with(SocketConfig::default(), SimStack::new().with_window(1000)).expect("layer");
    let fd = match open_connected(&l, peer(100)) {
        Some(fd) => fd,
        None => { t.fail("connected socket", "setup failed"); return; }
    };
    let pcb = match l.pcb_of(Fd(fd)) {
        Some(p) => p,
        None => { t.fail("connected handle", "missing"); return; }
    };

    let mut buf = [0u8; 16];
    t.expect("recv before data -> -EAGAIN", l.sys_recv(fd, &mut buf, 0), neg(libc::EAGAIN));

    let first = l.stack().deliver(pcb, b"0123456789").map(|(id, ev)| l.dispatch(id, ev));
    t.check("DATA(10 bytes) accepted", matches!(first, Some(EventReply::Ok)), "refused");
    let second = l.stack().deliver(pcb, b"abc").map(|(id, ev)| l.dispatch(id, ev));
    t.check("DATA while pending -> busy", matches!(second, Some(EventReply::Busy(_))), "not busy");
    let held = second.and_then(EventReply::into_refused);

    t.expect("recv(4) -> 4", l.sys_recv(fd, &mut buf[..4], 0), 4);
    t.expect("6 bytes still pending", l.pending_len(Fd(fd)) as i64, 6);
    t.expect("recv(6) -> 6", l.sys_recv(fd, &mut buf[..6], 0), 6);
    t.check("chunk released after full read", l.stack().released_chunks() == 1,
        &format!("{} released", l.stack().released_chunks()));
    t.expect("recv after drain -> -EAGAIN", l.sys_recv(fd, &mut buf, 0), neg(libc::EAGAIN));

    if let Some(chunk) = held {
        let again = l.stack().redeliver(pcb, chunk).map(|(id, ev)| l.dispatch(id, ev));
        t.check("held chunk redelivered", matches!(again, Some(EventReply::Ok)), "refused again");
        t.expect("recv -> 3", l.sys_recv(fd, &mut buf, 0), 3);
    }

    let data = vec![7u8; 2500];
    let mut sent = 0usize;
    let mut calls = 0;
    let mut over_window = false;
    while sent < data.len() && calls < 20 {
        let window = l.stack().send_window(pcb);
        let r = l.sys_send(fd, &data[sent..], 0);
        if r > 0 {
            over_window |= r as usize > window;
            sent += r as usize;
        } else if r == neg(libc::EAGAIN) {
            if let Some((id, ev)) = l.stack().ack(pcb, 1000) {
                l.dispatch(id, ev);
            }
        } else {
            break;
        }
        calls += 1;
    }
    t.check(&format!("2500 bytes over a 1000-byte window ({} calls)", calls),
        sent == data.len() && l.stack().written(pcb) == data, &format!("{} sent", sent));
    t.check("no send exceeded the window", !over_window, "window exceeded");

    l.stack().set_window(pcb, 0);
    t.expect("send into a closed window -> -EAGAIN", l.sys_send(fd, b"x", 0), neg(libc::EAGAIN));
    l.stack().set_window(pcb, 1000);

    let closed = l.stack().peer_close(pcb).map(|(id, ev)| l.dispatch(id, ev));
    t.check("peer close accepted", matches!(closed, Some(EventReply::Ok)), "refused");
    t.expect("recv at end of stream -> 0", l.sys_recv(fd, &mut buf, 0), 0);
    l.sys_close(fd);
}

// ════════════════════════════════════════════════════════════
// Part D: Connect completion, errors, teardown
// ════════════════════════════════════════════════════════════

fn test_connect(t: &mut TestRunner) {
    t.section("Part D: connect completion, stack errors, teardown");
    let l = Layer::simulated(SocketConfig::default()).expect("layer");
    l.procs().switch_to(Pid(7));

    let fd = l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP) as i32;
    let remote = peer(1).to_raw();
    t.expect("connect -> 0", l.sys_connect(fd, &remote, SOCKADDR_IN_LEN), 0);
    t.check("owner recorded", l.owner_pid(Fd(fd)) == Pid(7), "no owner");
    t.expect("second connect -> -EALREADY",
        l.sys_connect(fd, &remote, SOCKADDR_IN_LEN), neg(libc::EALREADY));

    if let Some((id, ev)) = l.pcb_of(Fd(fd)).and_then(|p| l.stack().establish(p, Err(StackErr::Rst))) {
        l.dispatch(id, ev);
    }
    t.check("owner cleared", l.owner_pid(Fd(fd)).is_none(), "still owned");
    let outcome = l.completions().try_take(Pid(7));
    t.check("completion -ECONNRESET delivered once",
        outcome == Some(-libc::ECONNRESET) && l.completions().try_take(Pid(7)).is_none(),
        &format!("{:?}", outcome));

    l.stack().inject(SimOp::Connect, StackErr::Rte);
    t.expect("connect refused by stack -> -EHOSTUNREACH",
        l.sys_connect(fd, &remote, SOCKADDR_IN_LEN), neg(libc::EHOSTUNREACH));
    t.check("refused connect leaves nothing armed", !l.completions().is_armed(Pid(7)), "armed");

    let live = match open_connected(&l, peer(2)) {
        Some(fd) => fd,
        None => { t.fail("second connection", "setup failed"); return; }
    };
    let dead = l.pcb_of(Fd(live)).and_then(|p| l.stack().abort(p, StackErr::Rst));
    let reply = dead.map(|(id, ev)| l.dispatch(id, ev));
    t.check("FATAL_ERROR -> abort reply",
        matches!(reply, Some(EventReply::Abort)), &format!("{:?}", reply.map(|r| r.code())));
    t.expect("send on dead socket -> -EINVAL", l.sys_send(live, b"x", 0), neg(libc::EINVAL));
    t.expect("recv on dead socket -> 0 (end of stream)", l.sys_recv(live, &mut [0u8; 4], 0), 0);
    t.check("other socket unaffected", l.pcb_of(Fd(fd)).is_some(), "lost handle");

    let before = l.stack().closes();
    l.sys_close(live);
    l.sys_close(fd);
    t.check("dead handle never closed",
        l.stack().closes() == before + 1 && l.stack().bad_closes() == 0,
        &format!("{} closes, {} bad", l.stack().closes() - before, l.stack().bad_closes()));
    t.expect("no sockets left", l.live_sockets() as i64, 0);
}

// ════════════════════════════════════════════════════════════

fn main() {
    kprint::init();
    println!("=== KSOCK End-to-End Smoke Test ===");
    println!("    log level: {:?}", kprint::log_level());

    let mut t = TestRunner::new();

    test_create(&mut t);
    test_server(&mut t);
    test_data(&mut t);
    test_connect(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
