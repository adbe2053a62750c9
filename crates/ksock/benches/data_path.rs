//! Data path costs: one chunk delivered through the dispatcher and
//! drained by `recv`, and one window-sized `send`.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use ksock::{SimPlatform, SocketConfig, SocketLayer};
use ksock_core::abi::{AF_INET, IPPROTO_TCP, SOCK_STREAM};
use ksock_core::kprint::{set_log_level, LogLevel};
use ksock_core::{Fd, SockAddrIn};

fn connected() -> (SocketLayer<SimPlatform>, Fd) {
    let l = SocketLayer::simulated(SocketConfig::default()).expect("layer");
    let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).expect("socket");
    l.connect(fd, SockAddrIn::any(9)).expect("connect");
    let pcb = l.pcb_of(fd).expect("pcb");
    let (id, ev) = l.stack().establish(pcb, Ok(())).expect("establish");
    l.dispatch(id, ev);
    (l, fd)
}

fn deliver_and_recv(c: &mut Criterion) {
    set_log_level(LogLevel::Off);
    let (l, fd) = connected();
    let pcb = l.pcb_of(fd).expect("pcb");
    let payload = vec![0xabu8; 1460];
    let mut buf = vec![0u8; 512];

    let mut group = c.benchmark_group("recv");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("deliver_1460_read_512", |b| {
        b.iter_batched(
            || l.stack().chunk(&payload),
            |chunk| {
                let (id, ev) = l.stack().redeliver(pcb, chunk).expect("redeliver");
                black_box(l.dispatch(id, ev));
                while let Ok(n) = l.recv(fd, &mut buf) {
                    black_box(n);
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn send_window(c: &mut Criterion) {
    set_log_level(LogLevel::Off);
    let (l, fd) = connected();
    let pcb = l.pcb_of(fd).expect("pcb");
    let data = vec![0x5au8; 4096];

    let mut group = c.benchmark_group("send");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("send_4096", |b| {
        b.iter(|| {
            let n = l.send(fd, &data, 0).unwrap_or(0);
            let (id, ev) = l.stack().ack(pcb, n as u16).expect("ack");
            black_box(l.dispatch(id, ev));
            black_box(l.stack().take_written(pcb));
        })
    });
    group.finish();
}

criterion_group!(benches, deliver_and_recv, send_window);
criterion_main!(benches);
