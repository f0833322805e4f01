//! Benchmarks for the built-in coder pairs

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use redbridge_core::{CacheDecoder, CacheEncoder, JsonDecoder, JsonEncoder, RedisRepresentable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hint::black_box;

#[cfg(feature = "msgpack")]
use redbridge_core::{MsgPackDecoder, MsgPackEncoder};

#[cfg(feature = "bincode")]
use redbridge_core::{BincodeDecoder, BincodeEncoder};

/// Session-like payload typical of cached values
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session {
    id: u64,
    user: String,
    roles: Vec<String>,
    attributes: HashMap<String, String>,
}

impl Session {
    fn with_attributes(count: usize) -> Self {
        Self {
            id: 12345,
            user: "user@example.com".to_string(),
            roles: vec!["reader".to_string(), "writer".to_string()],
            attributes: (0..count)
                .map(|i| (format!("attr_{i}"), "x".repeat(32)))
                .collect(),
        }
    }
}

fn bench_pair<E, D>(c: &mut Criterion, encoder: E, decoder: D)
where
    E: CacheEncoder,
    D: CacheDecoder,
{
    let cases = [
        ("small", Session::with_attributes(0)),
        ("medium", Session::with_attributes(10)),
        ("large", Session::with_attributes(100)),
    ];

    let mut group = c.benchmark_group(format!("coder/{}", encoder.name()));
    for (name, session) in &cases {
        group.bench_with_input(BenchmarkId::new("encode", name), session, |b, session| {
            b.iter(|| black_box(encoder.encode(black_box(session)).unwrap()));
        });

        let bytes = encoder.encode(session).unwrap().into_bytes();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode", name), &bytes, |b, bytes| {
            b.iter(|| {
                let input = D::Input::from_bytes(black_box(bytes.clone())).unwrap();
                let session: Session = decoder.decode(input).unwrap();
                black_box(session);
            });
        });
    }
    group.finish();
}

fn bench_coders(c: &mut Criterion) {
    bench_pair(c, JsonEncoder::new(), JsonDecoder);

    #[cfg(feature = "msgpack")]
    bench_pair(c, MsgPackEncoder, MsgPackDecoder);

    #[cfg(feature = "bincode")]
    bench_pair(c, BincodeEncoder, BincodeDecoder);
}

criterion_group!(benches, bench_coders);
criterion_main!(benches);
