//! Benchmarks comparing the two manifest decoders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keel_manifest::{decode_manifest, decode_manifest_scanned, encode_manifest, Manifest, ManifestEntry};

fn sample_manifest(n: usize) -> Manifest {
    let mod_time: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let entries = (0..n)
        .map(|i| {
            ManifestEntry::new(
                format!("entry-{i}"),
                BTreeMap::from([
                    ("type".to_string(), "snapshot".to_string()),
                    ("host".to_string(), format!("host-{}", i % 7)),
                ]),
                mod_time,
                format!(r#"{{"index":{i},"payload":"{}"}}"#, "x".repeat(128)).into_bytes(),
            )
        })
        .collect();

    Manifest { entries }
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_manifest");

    for &n in &[10usize, 100, 1000] {
        let encoded = encode_manifest(&sample_manifest(n)).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("streaming", n), &encoded, |b, data| {
            b.iter(|| decode_manifest(data).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("scanning", n), &encoded, |b, data| {
            b.iter(|| decode_manifest_scanned(data).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
