use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ensemble_store::{EnkfNode, KeyType, KindConfig, Matrix, NodeConfig, NodeKind, ScalarConfig};
use std::hint::black_box;

/// Keyword schema with alternating double and string keys
fn keyword_kind(key_count: usize) -> KindConfig {
    let keys = (0..key_count).map(|i| {
        let key_type = if i % 2 == 0 {
            KeyType::Double
        } else {
            KeyType::String
        };
        (format!("KEY_{i}"), key_type)
    });
    NodeConfig::new("BENCH", keys).unwrap().into()
}

fn scalar_kind(key_count: usize) -> KindConfig {
    ScalarConfig::new("BENCH", (0..key_count).map(|i| format!("X_{i}")))
        .unwrap()
        .into()
}

fn populated_keyword(kind: &KindConfig, key_count: usize) -> EnkfNode {
    let mut node = kind.create();
    let kw = node.as_custom_kw_mut().unwrap();
    for i in 0..key_count {
        let key = format!("KEY_{i}");
        if i % 2 == 0 {
            kw.set_double(&key, i as f64 * 1.25).unwrap();
        } else {
            kw.set_string(&key, "OPEN").unwrap();
        }
    }
    node
}

fn populated_scalar(kind: &KindConfig, key_count: usize) -> EnkfNode {
    let mut node = kind.create();
    let scalar = node.as_scalar_mut().unwrap();
    for i in 0..key_count {
        scalar.set(&format!("X_{i}"), i as f64).unwrap();
    }
    node
}

fn bench_node_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_creation");

    for key_count in [10, 100, 1000] {
        let kind = keyword_kind(key_count);
        group.bench_with_input(
            BenchmarkId::new("keyword_create", key_count),
            &kind,
            |b, kind| {
                b.iter(|| black_box(kind.create()));
            },
        );
    }

    group.finish();
}

fn bench_node_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_serialization");

    for key_count in [10, 100, 1000] {
        let kind = keyword_kind(key_count);
        let node = populated_keyword(&kind, key_count);
        let bytes = node.to_bytes();

        group.bench_with_input(
            BenchmarkId::new("keyword_write", key_count),
            &node,
            |b, node| {
                b.iter(|| black_box(node.to_bytes()));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("keyword_read", key_count),
            &bytes,
            |b, bytes| {
                let mut target = kind.create();
                b.iter(|| target.read_bytes(black_box(bytes)).unwrap());
            },
        );

        let scalar_kind = scalar_kind(key_count);
        let scalar = populated_scalar(&scalar_kind, key_count);
        let scalar_bytes = scalar.to_bytes();

        group.bench_with_input(
            BenchmarkId::new("scalar_write", key_count),
            &scalar,
            |b, node| {
                b.iter(|| black_box(node.to_bytes()));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("scalar_read", key_count),
            &scalar_bytes,
            |b, bytes| {
                let mut target = scalar_kind.create();
                b.iter(|| target.read_bytes(black_box(bytes)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_matrix_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_exchange");

    for key_count in [10, 100, 1000] {
        let kind = keyword_kind(key_count);
        let node = populated_keyword(&kind, key_count);
        let rows = node.active_size();

        group.bench_with_input(
            BenchmarkId::new("serialize_into", key_count),
            &node,
            |b, node| {
                let mut matrix = Matrix::new(rows, 1);
                b.iter(|| node.serialize_into(&mut matrix, 0, 0).unwrap());
            },
        );

        group.bench_with_input(
            BenchmarkId::new("deserialize_from", key_count),
            &node,
            |b, node| {
                let mut matrix = Matrix::new(rows, 1);
                node.serialize_into(&mut matrix, 0, 0).unwrap();
                let mut target = node.clone();
                b.iter(|| target.deserialize_from(black_box(&matrix), 0, 0).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_node_creation,
    bench_node_serialization,
    bench_matrix_exchange
);
criterion_main!(benches);
