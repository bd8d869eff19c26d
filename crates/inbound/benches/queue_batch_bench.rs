use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, use_case_fn};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use inbound::{QueueAdapter, QueueEvent, QueueOptions, QueueRecord, RecordAcknowledger};
use serde_json::{Value, json};

struct NoopAcknowledger;

#[async_trait]
impl RecordAcknowledger for NoopAcknowledger {
    async fn delete(&self, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }
}

fn make_batch(size: usize) -> QueueEvent {
    QueueEvent::new(
        (0..size)
            .map(|n| {
                let body = json!({"payload": {"id": n.to_string(), "userId": "bench"}});
                QueueRecord::new(format!("r{n}"), body.to_string())
                    .with_source("bench", format!("rt{n}"))
            })
            .collect(),
    )
}

fn bench_batches(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("queue_adapter/batch");

    for (label, options) in [
        ("parallel", QueueOptions::default()),
        ("sequential", QueueOptions::default().sequential()),
    ] {
        let adapter = QueueAdapter::<Value, _>::new(
            "bench",
            use_case_fn(|_: Value| async { Ok::<_, AppError>(()) }),
            Arc::new(NoopAcknowledger),
        )
        .options(options);

        for size in [1usize, 10, 100] {
            let batch = make_batch(size);
            group.bench_with_input(BenchmarkId::new(label, size), &batch, |b, batch| {
                b.iter(|| {
                    rt.block_on(async {
                        adapter.handle(batch.clone()).await.unwrap();
                    });
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_batches);
criterion_main!(benches);
