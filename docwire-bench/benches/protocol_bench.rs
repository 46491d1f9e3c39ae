//! Wire message framing benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docwire_bson::{Document, Value};
use docwire_protocol::{Decoder, Message, Op, OpMsg};

fn create_insert(batch: usize) -> OpMsg {
    let mut body = Document::new();
    body.set("insert", "bench");
    body.set("$db", "test");
    let documents = (0..batch)
        .map(|i| {
            let mut doc = Document::new();
            doc.set("_id", i as i64);
            doc.set("payload", Value::from("x".repeat(100)));
            doc
        })
        .collect();
    OpMsg::new(body).with_sequence("documents", documents)
}

fn bench_message_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_encode");

    for batch in [1, 100, 1000] {
        for checksum in [false, true] {
            let mut msg = create_insert(batch);
            if checksum {
                msg = msg.with_checksum();
            }
            let message = Message::new(1, 0, Op::Msg(msg));
            let size = message.encode().unwrap().len();
            let id = format!("{}{}", batch, if checksum { "/crc" } else { "" });

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(id), &message, |b, message| {
                b.iter(|| black_box(message.encode().unwrap()));
            });
        }
    }

    group.finish();
}

fn bench_message_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_decode");

    for batch in [1, 100, 1000] {
        let encoded = Message::new(1, 0, Op::Msg(create_insert(batch).with_checksum()))
            .encode()
            .unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Message::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_decoder_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder_stream");

    let one = Message::new(1, 0, Op::Msg(create_insert(10))).encode().unwrap();
    let mut stream = BytesMut::new();
    for _ in 0..100 {
        stream.extend_from_slice(&one);
    }

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_messages_4k_chunks", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let mut count = 0;
            for chunk in stream.chunks(4096) {
                decoder.extend(chunk);
                while let Some(message) = decoder.decode().unwrap() {
                    black_box(message);
                    count += 1;
                }
            }
            assert_eq!(count, 100);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_message_encode,
    bench_message_decode,
    bench_decoder_stream
);
criterion_main!(benches);
