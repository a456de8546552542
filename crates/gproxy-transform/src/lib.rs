//! Provider Adapter wire-conversion layer and Streaming Bridge (§4.6, §4.7).
//!
//! Vendor modules (`openai`, `claude`, `gemini`) each convert between their
//! own wire shape and the [`canonical`] intermediate representation; the
//! [`bridge`] module consumes the vendor-agnostic [`gproxy_provider_core::StreamChunk`]
//! stream a `Provider` adapter produces and renders it into whichever
//! `apiShape` the caller actually asked for.

pub mod bridge;
pub mod canonical;
pub mod claude;
pub mod gemini;
pub mod openai;
pub mod responses;
pub mod shape_io;

pub use canonical::{ChunkEvent, ChunkUsage};
