//! The A2A (agent-to-agent) Task Engine (§4.9): a stateful, streamable,
//! cancellable, webhookable task lifecycle layered on top of the same
//! Dispatcher the downstream HTTP surface uses (`gproxy-core`), via the
//! narrow [`dispatch::TaskDispatch`] seam rather than a direct dependency.

pub mod agent_card;
pub mod dispatch;
pub mod engine;
pub mod model;
pub mod push;
pub mod rpc;

pub use agent_card::{AgentCardConfig, build_agent_card};
pub use dispatch::{TaskDispatch, TaskDispatchOutcome};
pub use engine::{TaskEngine, TaskEngineConfig};
pub use push::{DeliveryLogRow, InMemoryDeliveryLog, PushDeliveryLog, PushDispatcher};
