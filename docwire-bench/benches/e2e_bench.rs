//! End-to-end client-server benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use docwire_bson::Document;
use docwire_protocol::{read_message, write_message, Message, Op, OpMsg, MAX_MESSAGE_SIZE};
use docwire_server::{HandshakeHandler, Server, ServerConfig};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::Mutex;

struct TestSetup {
    server: Arc<Server>,
    stream: Mutex<TcpStream>,
}

fn setup_server_and_client(rt: &Runtime) -> TestSetup {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(Server::new(
            ServerConfig::new(addr),
            Arc::new(HandshakeHandler::new()),
        ));
        let running = server.clone();
        tokio::spawn(async move {
            let _ = running.serve(listener).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        TestSetup {
            server,
            stream: Mutex::new(stream),
        }
    })
}

fn command(name: &str) -> Message {
    let mut body = Document::new();
    body.set(name, 1i32);
    body.set("$db", "admin");
    Message::new(1, 0, Op::Msg(OpMsg::new(body)))
}

async fn roundtrip(setup: &TestSetup, request: &Message) -> Message {
    let mut stream = setup.stream.lock().await;
    write_message(&mut *stream, request).await.unwrap();
    read_message(&mut *stream, MAX_MESSAGE_SIZE)
        .await
        .unwrap()
        .unwrap()
}

fn bench_ping_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);
    let ping = command("ping");

    let mut group = c.benchmark_group("e2e_ping");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ping", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(roundtrip(&setup, &ping).await) });
    });

    group.finish();
    setup.server.shutdown();
}

fn bench_hello_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);
    let hello = command("hello");

    let mut group = c.benchmark_group("e2e_hello");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hello", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(roundtrip(&setup, &hello).await) });
    });

    group.finish();
    setup.server.shutdown();
}

criterion_group!(benches, bench_ping_latency, bench_hello_latency);
criterion_main!(benches);
