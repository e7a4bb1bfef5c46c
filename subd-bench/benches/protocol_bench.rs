//! Framing, command building and reply parsing benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use subd_protocol::frame::{self, Frame};
use subd_protocol::{Command, Decoder, Filter, RecordFields, Reply, MAX_PAYLOAD_SIZE};

fn create_table(rows: usize) -> String {
    (1..=rows)
        .map(|id| format!("{}\tIvanov Ivan Ivanovich\t{}\t5\tsome info\n", id, 100 + id % 7))
        .collect()
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let payload = "x".repeat(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(frame::encode(payload.as_bytes()).unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let encoded = frame::encode("x".repeat(size).as_bytes()).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf, MAX_PAYLOAD_SIZE).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_decoder_interleaved(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder_interleaved");

    // Replies with a notification between each pair.
    let mut stream = BytesMut::new();
    for i in 0..100 {
        stream.extend_from_slice(&frame::encode(format!("reply {}", i).as_bytes()).unwrap());
        stream.extend_from_slice(&Frame::Sentinel.encode().unwrap());
    }

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_replies", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            decoder.extend(&stream);
            let mut count = 0;
            while let Some(text) = decoder.decode_text().unwrap() {
                black_box(text);
                count += 1;
            }
            count
        });
    });

    group.finish();
}

fn bench_command_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_build");
    group.throughput(Throughput::Elements(1));

    let filter = Filter::new()
        .with_id("3")
        .with_name("Ivanov Ivan")
        .with_group("101")
        .with_rating("5");
    group.bench_function("select", |b| {
        b.iter(|| black_box(Command::select(&filter).unwrap()));
    });

    let fields = RecordFields::new().with_rating("5").with_info("moved to 102");
    group.bench_function("update", |b| {
        b.iter(|| black_box(Command::update(&fields).unwrap()));
    });

    group.bench_function("print_page", |b| {
        b.iter(|| black_box(Command::print_page(black_box(42), 50)));
    });

    group.finish();
}

fn bench_reply_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_parse");

    for rows in [10, 100, 1000] {
        let table = create_table(rows);

        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &table, |b, table| {
            b.iter(|| black_box(Reply::parse(table)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_decoder_interleaved,
    bench_command_build,
    bench_reply_parse,
);

criterion_main!(benches);
