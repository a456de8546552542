use axum::Json;
use axum::response::{IntoResponse, Response};
use gproxy_provider_core::error::GatewayError;
use serde_json::json;

/// Renders a `GatewayError` to the HTTP response shape the §7 table
/// specifies, with the aggregated attempt log under `route_log` and no
/// secret or raw upstream body ever included.
pub struct HttpGatewayError(pub GatewayError);

impl IntoResponse for HttpGatewayError {
    fn into_response(self) -> Response {
        let status = self.0.kind.http_status();
        let mut body = json!({
            "error": {
                "kind": self.0.kind,
                "message": self.0.message,
                "route_log": self.0.route_log,
            }
        });
        if let Some(retry_after) = self.0.retry_after_secs {
            body["error"]["retry_after_secs"] = json!(retry_after);
        }
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for HttpGatewayError {
    fn from(value: GatewayError) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use gproxy_provider_core::ErrorKind;
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> (http::StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn renders_kind_message_and_route_log_without_a_retry_after_field() {
        let err = GatewayError::new(ErrorKind::UnknownModel, "no such model: gpt-nope")
            .with_route_log(vec![ErrorKind::UpstreamTransient, ErrorKind::UnknownModel]);

        let (status, body) = body_json(HttpGatewayError(err).into_response()).await;

        assert_eq!(status, http::StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "unknown_model");
        assert_eq!(body["error"]["message"], "no such model: gpt-nope");
        assert_eq!(body["error"]["route_log"], serde_json::json!(["upstream_transient", "unknown_model"]));
        assert!(body["error"].get("retry_after_secs").is_none());
    }

    #[tokio::test]
    async fn includes_retry_after_secs_only_when_present() {
        let err = GatewayError::new(ErrorKind::RateLimited, "slow down").with_retry_after_secs(15);

        let (status, body) = body_json(HttpGatewayError(err).into_response()).await;

        assert_eq!(status, http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["retry_after_secs"], 15);
    }

    #[tokio::test]
    async fn cancelled_renders_as_status_499() {
        let err = GatewayError::new(ErrorKind::Cancelled, "client went away");
        let (status, _) = body_json(HttpGatewayError(err).into_response()).await;
        assert_eq!(status.as_u16(), 499);
    }
}
