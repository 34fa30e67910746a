//! Benchmarks for document encoding
//!
//! Run with: cargo bench -p plinth_wire --bench encode
//!
//! Encodes wide rendered trees with a mix of scalars, callables and exported
//! objects, the shape a table-heavy dashboard produces.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plinth_core::{Callable, ObjectRef, Props, RenderedNode, Value};
use plinth_wire::{Exporter, NodeEncoder};

fn make_tree(rows: usize) -> RenderedNode {
    let tables: Vec<ObjectRef> = (0..8).map(|i| ObjectRef::typed(i, "Table")).collect();
    let children: Vec<Value> = (0..rows)
        .map(|i| {
            let mut props = Props::new();
            props.insert("label".into(), format!("row {i}").into());
            props.insert("value".into(), (i as f64 * 0.5).into());
            props.insert("onPress".into(), Callable::action(|| {}).into());
            props.insert("table".into(), tables[i % tables.len()].clone().into());
            RenderedNode::new("Row", Some(props)).into()
        })
        .collect();

    let mut props = Props::new();
    props.insert("children".into(), Value::List(children));
    RenderedNode::new("Flex", Some(props))
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode/rows");
    let encoder = NodeEncoder::new();

    for rows in [10, 100, 1_000] {
        let tree = make_tree(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &tree, |b, tree| {
            let mut exporter = Exporter::new();
            b.iter(|| {
                let encoded = encoder.encode(black_box(tree), &mut exporter);
                black_box(encoded.map(|e| e.payload.len()).unwrap_or_default())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
