//! End-to-end request latency against an in-process server.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use subd_client::{Connection, ConnectionConfig};
use subd_protocol::codec::{Decoder, Encoder};
use subd_protocol::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// Answers every `print range=a-b` with `b - a + 1` rows.
async fn serve(listener: TcpListener) {
    while let Ok((mut socket, _)) = listener.accept().await {
        tokio::spawn(async move {
            let mut decoder = Decoder::new();
            let mut buf = vec![0u8; 8192];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.extend(&buf[..n]);
                while let Ok(Some(command)) = decoder.decode_text() {
                    let reply = reply_for(&command);
                    let frame = Encoder::encode_text(&reply).unwrap();
                    if socket.write_all(&frame).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

fn reply_for(command: &str) -> String {
    let rows = command
        .strip_prefix("print range=")
        .and_then(|range| range.split_once('-'))
        .and_then(|(a, b)| Some(b.parse::<u64>().ok()? - a.parse::<u64>().ok()? + 1))
        .unwrap_or(0);
    if rows == 0 {
        return "Команда выполнена успешно".to_string();
    }
    (1..=rows)
        .map(|id| format!("{}\tIvanov Ivan Ivanovich\t101\t5\tinfo\n", id))
        .collect()
}

fn setup(rt: &Runtime) -> Arc<Connection> {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener));

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();
        conn
    })
}

fn bench_save_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let conn = setup(&rt);

    let mut group = c.benchmark_group("e2e_status");
    group.throughput(Throughput::Elements(1));

    let command = Command::save();
    group.bench_function("save", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(conn.send(&command).await.unwrap()) });
    });

    group.finish();
}

fn bench_page_fetch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let conn = setup(&rt);

    let mut group = c.benchmark_group("e2e_page");

    for page_size in [10, 100, 1000] {
        let command = Command::print_page(1, page_size);

        group.throughput(Throughput::Elements(page_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(page_size),
            &command,
            |b, command| {
                b.to_async(&rt)
                    .iter(|| async { black_box(conn.send(command).await.unwrap()) });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_save_latency, bench_page_fetch);
criterion_main!(benches);
