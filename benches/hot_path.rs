//! Criterion benchmarks for the httpcap hot path:
//! - `protocol::parse_packet` (zero-copy header parsing)
//! - `ReceiveWindow` insert/confirm with out-of-order segments
//! - `Assembler::assemble` (connection lookup plus window update)

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use httpcap::assembly::{
    Assembler, ConnectionHandler, ConnectionStreams, FlowFilter, ReceiveWindow, Segment,
    StreamOptions, TcpFlags,
};
use httpcap::flow::Endpoint;
use httpcap::protocol::{parse_packet, LinkType};
use std::net::{IpAddr, Ipv4Addr};

/// Build an Ethernet + IPv4 + TCP frame carrying `payload`.
fn make_tcp_packet(
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let total = 54 + payload.len();
    let mut pkt = vec![0u8; total];

    // Ethernet header
    pkt[0..6].copy_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pkt[6..12].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    pkt[12] = 0x08;
    pkt[13] = 0x00;

    // IPv4 header (20 bytes, no options)
    let ip = &mut pkt[14..34];
    ip[0] = 0x45;
    let ip_len = (20 + 20 + payload.len()) as u16;
    ip[2..4].copy_from_slice(&ip_len.to_be_bytes());
    ip[4..6].copy_from_slice(&[0x00, 0x01]);
    ip[6] = 0x40; // DF
    ip[8] = 64;
    ip[9] = 6; // TCP
    ip[12..16].copy_from_slice(&src_ip);
    ip[16..20].copy_from_slice(&dst_ip);

    // TCP header (20 bytes, no options)
    let tcp = &mut pkt[34..54];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&1000u32.to_be_bytes());
    tcp[8..12].copy_from_slice(&5000u32.to_be_bytes());
    tcp[12] = 0x50;
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&65535u16.to_be_bytes());

    pkt[54..].copy_from_slice(payload);
    pkt
}

fn bench_parse_packet(c: &mut Criterion) {
    let syn = make_tcp_packet([192, 168, 1, 10], [10, 0, 0, 1], 51000, 80, 0x02, &[]);
    let data = make_tcp_packet(
        [192, 168, 1, 10],
        [10, 0, 0, 1],
        51000,
        80,
        0x18,
        &[0x41u8; 1400],
    );

    let mut group = c.benchmark_group("parse_packet");
    group.throughput(Throughput::Elements(1));

    group.bench_function("tcp_syn_54B", |b| {
        b.iter(|| {
            let _ = black_box(parse_packet(black_box(&syn), LinkType::Ethernet));
        })
    });

    group.bench_function("tcp_data_1454B", |b| {
        b.iter(|| {
            let _ = black_box(parse_packet(black_box(&data), LinkType::Ethernet));
        })
    });

    group.finish();
}

fn segment(seq: u32, len: usize) -> Segment {
    Segment {
        seq,
        ack: 0,
        flags: TcpFlags {
            ack: true,
            ..TcpFlags::default()
        },
        payload: vec![0x42; len],
        ts: 0.0,
    }
}

fn bench_receive_window(c: &mut Criterion) {
    const SEGMENTS: u32 = 32;
    const LEN: usize = 1400;

    // Every pair swapped: 2, 1, 4, 3, ...
    let order: Vec<u32> = (0..SEGMENTS).map(|i| i ^ 1).collect();

    let mut group = c.benchmark_group("receive_window");
    group.throughput(Throughput::Elements(SEGMENTS as u64));

    group.bench_function("insert_confirm_32_reordered", |b| {
        b.iter(|| {
            let mut window = ReceiveWindow::new(64);
            for &i in &order {
                window.insert(segment(1000 + i * LEN as u32, LEN));
            }
            let mut bytes = 0usize;
            window.confirm(1000 + SEGMENTS * LEN as u32, |s| bytes += s.payload.len());
            black_box(bytes);
        })
    });

    group.finish();
}

struct Discard;

impl ConnectionHandler for Discard {
    fn handle(&self, _src: Endpoint, _dst: Endpoint, _streams: ConnectionStreams) {}

    fn finish(&self) {}
}

fn bench_assemble(c: &mut Criterion) {
    let client = Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), 51000);
    let server = Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 80);
    let assembler = Assembler::new(Discard, FlowFilter::default(), StreamOptions::default());

    // Open the connection with a request so later segments are tracked.
    let request = b"POST /upload HTTP/1.1\r\nHost: bench\r\nTransfer-Encoding: chunked\r\n\r\n";
    let mut open = segment(1000, 0);
    open.payload = request.to_vec();
    assembler.assemble(client, server, open);

    let mut group = c.benchmark_group("assembler");
    group.throughput(Throughput::Elements(2));

    // Each iteration sends one data segment and the ACK that releases it,
    // on a connection that stays open.
    let mut seq = 1000u32.wrapping_add(request.len() as u32);
    group.bench_function("assemble_data_and_ack", |b| {
        b.iter(|| {
            let data = segment(seq, 512);
            let next = seq.wrapping_add(512);
            assembler.assemble(client, server, black_box(data));
            let mut ack = segment(5000, 0);
            ack.ack = next;
            assembler.assemble(server, client, black_box(ack));
            seq = next;
        })
    });

    group.finish();
    assembler.finish_all();
}

criterion_group!(
    benches,
    bench_parse_packet,
    bench_receive_window,
    bench_assemble
);
criterion_main!(benches);
