//! Configuration, request context and shared domain types

pub mod clock;
pub mod config;
pub mod context;
pub mod models;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigProvider, LiveConfig};
pub use context::RequestContext;
pub use models::{
    DetailLevel, Participant, SummaryContext, SummaryKind, SummaryRange, SummaryRecord,
    SummaryRequest,
};
