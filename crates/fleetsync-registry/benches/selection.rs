use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fleetsync_core::{Checksum, ChecksumRow, ChecksumValue, Domain, NodeEntry, PeerAddress, PerDomain};
use fleetsync_registry::select;

fn fleet(size: usize) -> Vec<NodeEntry> {
    let local = PerDomain::from_fn(|_| Checksum(1));
    (0..size)
        .map(|i| {
            let mut entry = NodeEntry::new(PeerAddress::new(format!("10.0.{}.{}", i / 256, i % 256), 6032), i as u64 % 4, "");
            let row = ChecksumRow {
                domain: Domain::MysqlQueryRules,
                value: ChecksumValue::new(Checksum(2 + (i as u64 % 3)), 2, 10),
            };
            for t in 0..4 {
                entry.set_checksums(&[row], &local, (i % 7) as i64 * 10 + t);
            }
            entry
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let exclude = HashSet::new();
    for size in [8usize, 64, 512] {
        let entries = fleet(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter(|| {
                select(
                    black_box(entries),
                    Domain::MysqlQueryRules,
                    ChecksumValue::new(Checksum(1), 2, 1),
                    3,
                    &exclude,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
