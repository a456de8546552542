//! `GET /metrics` (§6): Prometheus text-format rendering of the
//! [`gproxy_storage::InMemoryMetricsSink`] the Dispatcher/handler populate
//! as requests flow through.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use gproxy_storage::InMemoryMetricsSink;
use http::header::CONTENT_TYPE;
use http::HeaderValue;

pub async fn metrics(State(sink): State<Arc<InMemoryMetricsSink>>) -> Response {
    let body = sink.render();
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
    response
}
