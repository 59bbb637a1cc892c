use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use fiscalpos_core::SystemClock;
use fiscalpos_fiscal::NcfType;
use fiscalpos_infra::registry_store::{InMemoryRegistryStore, RegistryStore};
use fiscalpos_infra::sequence_store::InMemorySequenceStore;
use fiscalpos_infra::NcfAllocator;
use fiscalpos_registry::RegistryRecord;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn allocator() -> NcfAllocator {
    // Keep the low-sequence warning out of the measured path.
    NcfAllocator::new(Arc::new(InMemorySequenceStore::new()), Arc::new(SystemClock))
        .with_low_sequence_threshold(0)
        .with_expiry_warning_days(-1)
}

fn bench_allocation_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("ncf_allocation_latency");
    group.sample_size(1000);

    group.bench_function("allocate_single_caller", |b| {
        let alloc = allocator();
        b.iter(|| {
            let ncf = rt.block_on(alloc.allocate(NcfType::Consumer)).unwrap();
            black_box(ncf);
        });
    });

    group.finish();
}

fn bench_allocation_contention(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("ncf_allocation_contention");

    for callers in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*callers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(callers), callers, |b, &callers| {
            let alloc = allocator();
            b.iter(|| {
                rt.block_on(async {
                    let mut tasks = Vec::with_capacity(callers);
                    for _ in 0..callers {
                        let alloc = alloc.clone();
                        tasks.push(tokio::spawn(async move {
                            alloc.allocate(NcfType::Consumer).await
                        }));
                    }
                    for t in tasks {
                        black_box(t.await.unwrap().unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_registry_search(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("registry_search");

    for size in [1_000u32, 10_000, 100_000].iter() {
        let store = InMemoryRegistryStore::new();
        let now = Utc::now();
        rt.block_on(async {
            for i in 0..*size {
                let record = RegistryRecord::new(format!("1{i:08}"), format!("COMERCIAL {i} SRL"), now);
                store.upsert(&record).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let hits = rt.block_on(store.search(black_box("comercial 99"), 50)).unwrap();
                black_box(hits);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_allocation_latency,
    bench_allocation_contention,
    bench_registry_search
);
criterion_main!(benches);
