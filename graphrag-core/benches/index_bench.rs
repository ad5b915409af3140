use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use graphrag_core::embedding::{mock_embedding, prepare};
use graphrag_core::{EmbeddingDomain, QueryRouter, RecordId, VectorIndex, WorkflowRecord};

fn sample_record(id: usize) -> WorkflowRecord {
    let content = format!("Approval routing for requisition {id} and contract file review");
    WorkflowRecord {
        id: RecordId::new(),
        embedding: mock_embedding(&prepare(&content)),
        content,
        document_type: "requisition".to_string(),
        timestamp: Utc::now(),
    }
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [100, 1000, 10000].iter() {
        let index = VectorIndex::with_dimension(768);
        for i in 0..*size {
            index.store(sample_record(i)).expect("store");
        }
        let query = mock_embedding(&prepare("contract approval routing"));

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_function(format!("find_similar_{size}"), |b| {
            b.iter(|| {
                index
                    .find_similar(
                        EmbeddingDomain::UserRecords,
                        black_box(&query),
                        black_box(10),
                        0.15,
                    )
                    .expect("search")
            })
        });
    }

    group.finish();
}

fn bench_embedding(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding");
    let text = "The contracting officer shall document the determination of price \
                reasonableness before award of any contract exceeding the simplified \
                acquisition threshold.";

    group.bench_function("prepare", |b| b.iter(|| prepare(black_box(text))));

    let prepared = prepare(text);
    group.bench_function("mock_embedding", |b| {
        b.iter(|| mock_embedding(black_box(&prepared)))
    });

    let router = QueryRouter::new();
    group.bench_function("route_query", |b| {
        b.iter(|| router.classify(black_box("my previous FAR clause approvals")))
    });

    group.finish();
}

criterion_group!(benches, bench_index, bench_embedding);
criterion_main!(benches);
