//! Numbering service entry point.

use std::process::ExitCode;

use metrics_exporter_prometheus::PrometheusBuilder;
use numbering::{NumberingConfig, NumberingService};
use numbering_service::{
    Config, LogFormat, ensure_series, feed_lines, forward_published, park_stranded, settle_unacked,
};
use pipeline::{InMemoryBus, NumberingHandler, NumberingWorker, PipelineConfig};
use series_store::PostgresSeriesStore;
use sqlx::postgres::PgPoolOptions;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    // Logs go to stderr; stdout carries invoice-created lines.
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Configuration and tracing
    let config = Config::from_env();
    let pipeline_config = PipelineConfig::from_env();
    init_tracing(&config);

    // 2. Install Prometheus exporter
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()
        .expect("failed to install Prometheus exporter");
    tracing::info!(addr = %config.metrics_addr, "metrics exporter listening");

    // 3. Connect the series store
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = PostgresSeriesStore::new(pool);
    store.run_migrations().await.expect("migrations failed");

    if config.seed_series {
        let series = ensure_series(
            &store,
            &pipeline_config.series_name,
            &config.seed_doc_type,
            config.seed_baseline,
        )
        .await
        .expect("failed to seed series");
        tracing::info!(series_id = %series.id, last_value = series.last_value, "series ready");
    }

    // 4. Build the pipeline
    let bus = InMemoryBus::without_history();
    let numbering = NumberingService::with_config(store, NumberingConfig::from_env());
    let worker = NumberingWorker::new(NumberingHandler::new(
        numbering,
        bus.clone(),
        pipeline_config.clone(),
    ));

    let mut dead_letters: Box<dyn AsyncWrite + Send + Unpin> = match &config.dead_letter_path {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .expect("failed to open dead-letter file"),
        ),
        None => Box::new(tokio::io::stderr()),
    };

    // 5. Stdin feeder
    let feeder = tokio::spawn({
        let bus = bus.clone();
        let topic = pipeline_config.inbound_topic.clone();
        async move { feed_lines(BufReader::new(tokio::io::stdin()), &bus, &topic).await }
    });

    // 6. Invoices to stdout, dead letters to their sink
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let sink = tokio::spawn({
        let bus = bus.clone();
        let config = pipeline_config.clone();
        async move {
            let mut stdout = tokio::io::stdout();
            loop {
                let forwarded = futures_util::future::join(
                    forward_published(
                        &bus,
                        &config.outbound_topic,
                        &mut stdout,
                        config.batch_size,
                    ),
                    forward_published(
                        &bus,
                        &config.dead_letter_topic,
                        &mut dead_letters,
                        config.batch_size,
                    ),
                )
                .await;
                if let (Err(e), _) | (_, Err(e)) = forwarded {
                    tracing::error!(error = %e, "failed to write output");
                }
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = stop_rx.changed() => {}
                    () = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            dead_letters
        }
    });

    // 7. Redeliver whatever stayed unacknowledged past the ack wait
    let redelivery = tokio::spawn({
        let bus = bus.clone();
        let topic = pipeline_config.inbound_topic.clone();
        let ack_wait = config.ack_wait;
        async move {
            let mut ticker = tokio::time::interval(ack_wait);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let requeued = bus.redeliver_unacked_on(&topic).await;
                if requeued > 0 {
                    tracing::warn!(requeued, "ack wait expired, redelivering");
                }
            }
        }
    });

    // 8. Run until signalled or input is exhausted
    let input_done = async {
        match feeder.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "stdin feeder failed"),
            Err(e) => tracing::error!(error = %e, "stdin feeder panicked"),
        }
    };
    let shutdown = async {
        tokio::select! {
            () = shutdown_signal() => {}
            () = input_done => {}
        }
    };
    worker.run(shutdown).await;
    redelivery.abort();

    // 9. Settle held messages, flush output, park anything left
    if let Err(e) = worker.drain().await {
        tracing::error!(error = %e, "final drain failed");
    }
    let stranded = settle_unacked(
        &worker,
        &bus,
        &pipeline_config.inbound_topic,
        config.shutdown_retries,
        config.shutdown_backoff,
    )
    .await;

    let _ = stop_tx.send(true);
    let mut dead_letters: Box<dyn AsyncWrite + Send + Unpin> = match sink.await {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!(error = %e, "output sink panicked");
            Box::new(tokio::io::stderr())
        }
    };

    if stranded.is_empty() {
        tracing::info!("numbering service shut down gracefully");
        return ExitCode::SUCCESS;
    }

    tracing::error!(
        count = stranded.len(),
        "messages still unacknowledged at exit, parking them as dead letters"
    );
    if let Err(e) = park_stranded(&stranded, &mut dead_letters).await {
        tracing::error!(error = %e, "failed to park unacknowledged messages");
    }
    ExitCode::FAILURE
}
