//! Router: alias resolution + health/cooldown filtering (§4.4) and the
//! per-provider Circuit/Cooldown state machine (§4.8).

pub mod alias;
pub mod circuit;
pub mod hash;
pub mod router;

pub use alias::{AliasTable, ProviderCapabilities};
pub use circuit::{CircuitConfig, CircuitRegistry};
pub use router::{RouteError, Router};
