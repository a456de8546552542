//! The gateway's request-facing core: Ingress Decoder (§4.1), Auth &
//! Principal (§4.2), Quota Admission (§4.3), the Dispatcher state machine
//! (§4.5), and the axum handler wiring for the downstream HTTP surface
//! (§6). Provider Adapters and wire-format transforms live in
//! `gproxy-provider-impl`/`gproxy-transform`; model routing and circuit
//! state live in `gproxy-router`.

pub mod auth;
pub mod decode;
pub mod dispatcher;
pub mod error_http;
pub mod handler;
pub mod quota;

pub use auth::{AuthError, AuthSnapshot, CredentialCache};
pub use decode::{DecodeError, decode};
pub use dispatcher::{Dispatcher, DispatcherOutcome};
pub use handler::{AppState, build_router};
pub use quota::{QuotaAdmission, QuotaDecision, QuotaDenyKind};
