//! Observability for the versioned storage service: a process-wide
//! Prometheus registry behind [`VssMetrics`], tracing setup, and a
//! scrape endpoint.
//!
//! Callers go through the recording methods rather than raw counters,
//! so the label vocabulary stays in one place.

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use prometheus::{
    HistogramOpts, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;
use tokio::net::TcpListener;

/// Install the global tracing subscriber. The filter comes from
/// `RUST_LOG`; `info` applies when it is unset or unparsable.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Request metrics for a VSS server.
///
/// One instance exists per process (see [`VssMetrics::global`]); every
/// field is registered against the owned [`Registry`] at construction.
pub struct VssMetrics {
    registry: Registry,
    requests: IntCounterVec,
    failures: IntCounterVec,
    request_latency_secs: HistogramVec,
    conflicts: IntCounter,
    auth_rejections: IntCounter,
}

impl VssMetrics {
    /// The process-wide instance, created on first use.
    pub fn global() -> &'static VssMetrics {
        static GLOBAL: OnceLock<VssMetrics> = OnceLock::new();
        GLOBAL.get_or_init(VssMetrics::new)
    }

    fn new() -> Self {
        let requests = IntCounterVec::new(
            Opts::new("vss_requests_total", "Requests received, by operation"),
            &["op"],
        )
        .expect("requests counter");
        let failures = IntCounterVec::new(
            Opts::new(
                "vss_request_failures_total",
                "Failed requests, by operation and error code",
            ),
            &["op", "code"],
        )
        .expect("failures counter");
        let request_latency_secs = HistogramVec::new(
            HistogramOpts::new("vss_request_latency_seconds", "Request latency in seconds"),
            &["op"],
        )
        .expect("latency histogram");
        let conflicts = IntCounter::with_opts(Opts::new(
            "vss_conflicts_total",
            "Optimistic-concurrency conflicts returned to clients",
        ))
        .expect("conflicts counter");
        let auth_rejections = IntCounter::with_opts(Opts::new(
            "vss_auth_rejections_total",
            "Requests rejected by the authorizer",
        ))
        .expect("auth_rejections counter");

        let registry = Registry::new();
        let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
            Box::new(requests.clone()),
            Box::new(failures.clone()),
            Box::new(request_latency_secs.clone()),
            Box::new(conflicts.clone()),
            Box::new(auth_rejections.clone()),
        ];
        for collector in collectors {
            registry.register(collector).expect("metric registration");
        }

        Self {
            registry,
            requests,
            failures,
            request_latency_secs,
            conflicts,
            auth_rejections,
        }
    }

    /// Count a request and start its latency timer; elapsed time is
    /// recorded when the returned guard drops.
    pub fn record_request(&self, op: &str) -> HistogramTimer {
        self.requests.with_label_values(&[op]).inc();
        self.request_latency_secs
            .with_label_values(&[op])
            .start_timer()
    }

    /// Count a failed request under its error-code label.
    pub fn record_failure(&self, op: &str, code: &str) {
        self.failures.with_label_values(&[op, code]).inc();
    }

    /// Count a conflict returned to a client.
    pub fn record_conflict(&self) {
        self.conflicts.inc();
    }

    /// Count a request the authorizer turned away.
    pub fn record_auth_rejection(&self) {
        self.auth_rejections.inc();
    }

    /// Render everything registered here in the Prometheus text
    /// exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        TextEncoder::new()
            .encode_utf8(&self.registry.gather(), &mut out)
            .expect("prometheus text encoding");
        out
    }
}

/// Serve the scrape endpoint on an already-bound listener. Every path
/// answers with the current exposition, which is all Prometheus needs.
pub async fn serve_metrics(listener: TcpListener) -> std::io::Result<()> {
    tracing::info!(
        "metrics listening on http://{}/metrics",
        listener.local_addr()?
    );

    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let handler = service_fn(|_req| async {
                let response = Response::builder()
                    .header("content-type", prometheus::TEXT_FORMAT)
                    .body(Full::new(Bytes::from(VssMetrics::global().render())))
                    .expect("valid HTTP response");
                Ok::<_, std::convert::Infallible>(response)
            });
            let served = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), handler)
                .await;
            if let Err(e) = served {
                tracing::debug!("scrape connection failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_counts_and_times() {
        let m = VssMetrics::global();

        let before = m.requests.with_label_values(&["put"]).get();
        let samples_before = m
            .request_latency_secs
            .with_label_values(&["put"])
            .get_sample_count();

        m.record_request("put").observe_duration();
        m.record_request("put").observe_duration();

        assert_eq!(m.requests.with_label_values(&["put"]).get(), before + 2);
        assert_eq!(
            m.request_latency_secs
                .with_label_values(&["put"])
                .get_sample_count(),
            samples_before + 2
        );
    }

    #[test]
    fn test_failure_and_outcome_counters() {
        let m = VssMetrics::global();

        let conflicts_before = m.conflicts.get();
        let auth_before = m.auth_rejections.get();
        let failures_before = m.failures.with_label_values(&["get", "no_such_key"]).get();

        m.record_failure("get", "no_such_key");
        m.record_conflict();
        m.record_auth_rejection();

        assert_eq!(
            m.failures.with_label_values(&["get", "no_such_key"]).get(),
            failures_before + 1
        );
        assert_eq!(m.conflicts.get(), conflicts_before + 1);
        assert_eq!(m.auth_rejections.get(), auth_before + 1);
    }

    #[test]
    fn test_render_exposition_format() {
        let m = VssMetrics::global();
        m.record_request("list").observe_duration();

        let output = m.render();
        assert!(output.contains("vss_requests_total"));
        assert!(output.contains("vss_request_latency_seconds"));
        assert!(output.contains("vss_conflicts_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
