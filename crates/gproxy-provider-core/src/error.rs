use serde::{Deserialize, Serialize};

/// The §7 error taxonomy: kinds, not types. Every fallible component
/// ultimately classifies its failure into one of these before it crosses a
/// component boundary, so the Dispatcher and the HTTP edge can apply the
/// same retryability and status-code rules regardless of origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Unauthenticated,
    Forbidden,
    UnknownModel,
    UnknownTask,
    QuotaExceeded,
    RateLimited,
    UpstreamTransient,
    UpstreamProtocol,
    AllProvidersCoolingDown,
    DeadlineExceeded,
    Cancelled,
    TaskNotCancelable,
    TaskTerminal,
    Internal,
}

impl ErrorKind {
    /// Whether this kind, on its own, is one the Dispatcher may retry by
    /// consuming another attempt (§4.5, §7 "Propagation").
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::UpstreamTransient | ErrorKind::UpstreamProtocol
        )
    }

    /// Default HTTP status for this kind when the budget is exhausted or
    /// the kind is fatal outright (§7 "Surfaced As").
    pub fn http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::UnknownModel | ErrorKind::UnknownTask => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamTransient => StatusCode::BAD_GATEWAY,
            ErrorKind::UpstreamProtocol => StatusCode::BAD_GATEWAY,
            ErrorKind::AllProvidersCoolingDown => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            ErrorKind::TaskNotCancelable | ErrorKind::TaskTerminal => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A classified error carrying enough context to render an HTTP response
/// without leaking upstream secrets. `route_log` holds the per-attempt
/// error kinds in order, for §7's "Aggregated attempt errors ... under a
/// `route_log` field".
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub route_log: Vec<ErrorKind>,
    #[serde(default)]
    pub retry_after_secs: Option<u64>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            route_log: Vec::new(),
            retry_after_secs: None,
        }
    }

    pub fn with_route_log(mut self, route_log: Vec<ErrorKind>) -> Self {
        self.route_log = route_log;
        self
    }

    pub fn with_retry_after_secs(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn unknown_model(alias: &str) -> Self {
        Self::new(ErrorKind::UnknownModel, format!("unknown model alias: {alias}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
