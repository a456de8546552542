use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// The Adapter's normalized response, before it is rendered back into the
/// caller's downstream wire shape (§4.6 step 3: "Response normalization").
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub upstream_model: String,
    pub content: Value,
    pub finish_reason: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// The Dispatcher's final answer to the caller, grounded on the teacher's
/// `ProxyResponse::{Json,Stream}` split between a fully-buffered body and an
/// opaque byte stream destined for the Streaming Bridge.
#[derive(Debug)]
pub enum ProxyResponse {
    Json {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Stream {
        status: StatusCode,
        headers: HeaderMap,
        body: StreamBody,
    },
}

pub struct StreamBody {
    pub content_type: &'static str,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>,
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody")
            .field("content_type", &self.content_type)
            .field("stream", &"<opaque>")
            .finish()
    }
}

impl StreamBody {
    pub fn new<S>(content_type: &'static str, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        Self {
            content_type,
            stream: Box::pin(stream),
        }
    }
}
