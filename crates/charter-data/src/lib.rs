//! Live and historical data for charter.
//!
//! - [`supervisor`] - pure connection resilience state machine
//! - [`live`] - async driver running the supervisor over a push transport
//! - [`tradeflow`] - TradeFlow backend implementations of the source traits
//! - [`validation`] - checks applied to everything arriving from the backend

pub mod live;
pub mod source;
pub mod supervisor;
pub mod throttle;
pub mod tradeflow;
pub mod validation;

pub use live::{LiveConfig, LiveDataEvent, LiveDataManager, LiveHandle};
pub use source::{HistoricalSource, PollSource, PushTransport};
pub use supervisor::{
    LiveSource, Supervisor, SupervisorAction, SupervisorConfig, SupervisorEvent, SupervisorInput,
    SupervisorState,
};
pub use throttle::Throttle;
pub use tradeflow::TradeflowSource;
