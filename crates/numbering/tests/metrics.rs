//! Metrics emitted by the numbering service.

use common::{DocumentId, SeriesId};
use metrics_exporter_prometheus::PrometheusBuilder;
use numbering::NumberingService;
use series_store::{InMemorySeriesStore, NewSeries, SeriesStore};

fn sample_count(rendered: &str, name: &str) -> Option<u64> {
    let prefix = format!("{name}_count ");
    rendered
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .and_then(|count| count.trim().parse().ok())
}

#[tokio::test]
async fn assign_duration_recorded_for_every_outcome() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let store = InMemorySeriesStore::new();
    let series = store
        .create_series(NewSeries::new("1", "invoice"))
        .await
        .unwrap();
    let service = NumberingService::new(store);
    let doc = DocumentId::new("docA");

    // Fresh assignment, idempotent hit, and a failed call
    service.assign_fiscal_number(series.id, &doc).await.unwrap();
    service.assign_fiscal_number(series.id, &doc).await.unwrap();
    assert!(
        service
            .assign_fiscal_number(SeriesId::new(), &doc)
            .await
            .is_err()
    );

    let rendered = handle.render();
    assert_eq!(
        sample_count(&rendered, "numbering_assign_duration_seconds"),
        Some(3)
    );
    assert!(rendered.contains("numbering_idempotent_hits_total 1"));
    assert!(rendered.contains("numbering_assignments_total 1"));
}
