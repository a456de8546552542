pub mod config;
pub mod ids;
pub mod time_window;

pub use config::{GlobalConfig, GlobalConfigError, GlobalConfigPatch};
pub use ids::{RequestId, TraceId};
pub use time_window::{Window, window_boundary};
