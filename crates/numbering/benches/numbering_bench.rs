use common::DocumentId;
use criterion::{Criterion, criterion_group, criterion_main};
use numbering::NumberingService;
use series_store::{InMemorySeriesStore, NewSeries, SeriesStore};

fn bench_assign_fresh(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemorySeriesStore::new();
    let series_id = rt
        .block_on(store.create_series(NewSeries::new("bench", "invoice")))
        .unwrap()
        .id;
    let service = NumberingService::new(store);
    let mut n: u64 = 0;

    c.bench_function("numbering/assign_fresh", |b| {
        b.iter(|| {
            n += 1;
            let doc = DocumentId::new(format!("doc-{n}"));
            rt.block_on(service.assign_fiscal_number(series_id, &doc))
                .unwrap();
        });
    });
}

fn bench_assign_redelivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemorySeriesStore::new();
    let series_id = rt
        .block_on(store.create_series(NewSeries::new("bench", "invoice")))
        .unwrap()
        .id;
    let service = NumberingService::new(store);
    let doc = DocumentId::new("redelivered");
    rt.block_on(service.assign_fiscal_number(series_id, &doc))
        .unwrap();

    c.bench_function("numbering/assign_redelivery", |b| {
        b.iter(|| {
            rt.block_on(service.assign_fiscal_number(series_id, &doc))
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_assign_fresh, bench_assign_redelivery);
criterion_main!(benches);
