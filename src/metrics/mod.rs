use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref CONFIG_MUTATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("config_mutations_total", "Committed config mutations"),
        &["variant", "kind"]
    )
    .expect("metric can not be created");

    pub static ref EVENT_DELIVERIES: IntCounter = IntCounter::new(
        "change_event_deliveries_total",
        "Change events handed to listener sessions"
    )
    .expect("metric can not be created");

    pub static ref LONG_POLL_WAITING: IntGauge = IntGauge::new(
        "long_poll_waiting_sessions",
        "Listener sessions currently suspended"
    )
    .expect("metric can not be created");

    pub static ref LONG_POLL_RESOLUTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("long_poll_resolutions_total", "How listener requests were answered"),
        &["resolution"]
    )
    .expect("metric can not be created");

    pub static ref LONG_POLL_HOLD_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("long_poll_hold_ms", "Time a suspended listener was held in ms")
            .buckets(exponential_buckets(1.0, 4.0, 10).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref BATCH_RECORDS: IntCounterVec = IntCounterVec::new(
        Opts::new("batch_records_total", "Per-record outcomes of import and clone batches"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(CONFIG_MUTATIONS.clone()),
            Box::new(EVENT_DELIVERIES.clone()),
            Box::new(LONG_POLL_WAITING.clone()),
            Box::new(LONG_POLL_RESOLUTIONS.clone()),
            Box::new(LONG_POLL_HOLD_MS.clone()),
            Box::new(BATCH_RECORDS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {}", e);
            }
        }
    });
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("metrics exporter listening on {}", addr);
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(render())
}

/// Text exposition of the crate's collectors
pub fn render() -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

#[cfg(test)]
mod metrics_test;
