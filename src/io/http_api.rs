//! HTTP screening service
//!
//! Endpoints:
//! - `POST /check` - body `{"first": .., "last": .., "dob": ..}`, returns a `MatchResult`
//! - `GET /lists` - per-list kind, size and `updated`
//! - `GET /metrics` - Prometheus text format
//! - `GET /health`
//!
//! Uses hyper for the HTTP server. Screening touches the filesystem on a
//! stale cache, so it runs on the blocking pool.

use crate::domain::types::{DateOfBirth, ListKind};
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::name_matcher::NameQuery;
use crate::services::screener::Screener;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Date of birth as sent by clients: epoch seconds or a date string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DobField {
    Epoch(i64),
    Text(String),
}

impl From<DobField> for DateOfBirth {
    fn from(field: DobField) -> Self {
        match field {
            DobField::Epoch(epoch) => DateOfBirth::Epoch(epoch),
            DobField::Text(text) => DateOfBirth::Text(text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    first: String,
    #[serde(default)]
    last: String,
    #[serde(default)]
    dob: Option<DobField>,
}

impl From<CheckRequest> for NameQuery {
    fn from(req: CheckRequest) -> Self {
        NameQuery { first: req.first, last: req.last, dob: req.dob.map(Into::into) }
    }
}

#[derive(Debug, Serialize)]
struct ListSummary {
    kind: ListKind,
    updated: i64,
    entries: usize,
}

fn json_response(status: StatusCode, body: String, request_id: &Uuid) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Request-Id", request_id.to_string())
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn internal_error(message: &str, request_id: &Uuid) -> Response<Full<Bytes>> {
    json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(message), request_id)
}

fn serialized_response<T: Serialize>(value: &T, request_id: &Uuid) -> Response<Full<Bytes>> {
    match serde_json::to_string(value) {
        Ok(body) => json_response(StatusCode::OK, body, request_id),
        Err(e) => internal_error(&e.to_string(), request_id),
    }
}

/// Write a counter or gauge line set
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: &str,
    val: impl std::fmt::Display,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {typ}");
    let _ = writeln!(output, "{name} {val}");
}

fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);

    let counters: [(&str, &str, u64); 7] = [
        ("sanctions_checks_total", "Screening checks answered", summary.checks_total),
        ("sanctions_matches_total", "Checks that reported a match", summary.matches_total),
        (
            "sanctions_store_errors_total",
            "Checks rejected because the store could not be loaded",
            summary.store_errors_total,
        ),
        ("sanctions_refreshes_total", "Completed refresh cycles", summary.refreshes_total),
        (
            "sanctions_refresh_failures_total",
            "Refresh cycles that failed",
            summary.refresh_failures_total,
        ),
        (
            "sanctions_lists_replaced_total",
            "Lists replaced by refreshes",
            summary.lists_replaced_total,
        ),
        ("sanctions_store_loads_total", "Reads of the backing document", summary.store_loads),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, "counter", val);
    }
    write_metric(
        &mut output,
        "sanctions_lists_loaded",
        "Lists in the current document",
        "gauge",
        summary.lists_loaded,
    );

    let name = "sanctions_check_latency_us";
    let _ = writeln!(output, "# HELP {name} Check latency in microseconds");
    let _ = writeln!(output, "# TYPE {name} histogram");
    let mut cumulative = 0u64;
    for (i, count) in summary.cumulative_latency_buckets.iter().enumerate() {
        cumulative += count;
        if i < METRICS_NUM_BUCKETS - 1 {
            let bound = METRICS_BUCKET_BOUNDS[i];
            let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
        } else {
            let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
        }
    }
    let _ = writeln!(output, "{name}_sum {}", summary.cumulative_latency_sum_us);
    let _ = writeln!(output, "{name}_count {cumulative}");

    output
}

async fn handle_check(
    req: Request<hyper::body::Incoming>,
    screener: Arc<Screener>,
    request_id: Uuid,
) -> Response<Full<Bytes>> {
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "api_body_rejected");
            let body = error_body("unreadable body");
            return json_response(StatusCode::BAD_REQUEST, body, &request_id);
        }
    };

    let query: NameQuery = match serde_json::from_slice::<CheckRequest>(&body) {
        Ok(parsed) => parsed.into(),
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "api_bad_request");
            let body = error_body(&e.to_string());
            return json_response(StatusCode::BAD_REQUEST, body, &request_id);
        }
    };

    let outcome = tokio::task::spawn_blocking(move || screener.check(&query)).await;
    match outcome {
        Ok(Ok(result)) => {
            info!(request_id = %request_id, matched = %result.matched, "api_check");
            serialized_response(&result, &request_id)
        }
        Ok(Err(e)) => {
            error!(request_id = %request_id, error = %e, "api_check_store_error");
            internal_error(&e.to_string(), &request_id)
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "api_check_task_failed");
            internal_error("check failed", &request_id)
        }
    }
}

async fn handle_lists(screener: Arc<Screener>, request_id: Uuid) -> Response<Full<Bytes>> {
    let store = Arc::clone(screener.store());
    let loaded = tokio::task::spawn_blocking(move || store.current_data()).await;

    match loaded {
        Ok(Ok(doc)) => {
            let summary: BTreeMap<&str, ListSummary> = doc
                .iter()
                .map(|(id, list)| {
                    let entries = list.entries.len();
                    (id.as_str(), ListSummary { kind: list.kind(), updated: list.updated, entries })
                })
                .collect();
            serialized_response(&summary, &request_id)
        }
        Ok(Err(e)) => {
            error!(request_id = %request_id, error = %e, "api_lists_store_error");
            internal_error(&e.to_string(), &request_id)
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "api_lists_task_failed");
            internal_error("lists failed", &request_id)
        }
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    screener: Arc<Screener>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = Uuid::now_v7();

    match (req.method(), req.uri().path()) {
        (&Method::POST, "/check") => Ok(handle_check(req, screener, request_id).await),
        (&Method::GET, "/lists") => Ok(handle_lists(screener, request_id).await),
        (&Method::GET, "/metrics") => {
            let store = Arc::clone(screener.store());
            let lists_loaded = tokio::task::spawn_blocking(move || {
                store.current_data().map(|doc| doc.len()).unwrap_or(0)
            })
            .await
            .unwrap_or(0);
            let summary = metrics.snapshot(lists_loaded, screener.store().load_count());
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(format_prometheus_metrics(&summary))))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Bind the listener; split from `serve` so callers can learn the bound port
pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    Ok(TcpListener::bind(addr).await?)
}

/// Serve screening requests on `listener` until shutdown
pub async fn serve(
    listener: TcpListener,
    screener: Arc<Screener>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let screener = screener.clone();
                        let metrics = metrics.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let screener = screener.clone();
                                let metrics = metrics.clone();
                                async move { handle_request(req, screener, metrics).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
