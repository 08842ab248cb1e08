//! Per-queue dispatch: receive a burst, answer what the cache knows, learn
//! what the resolver says.

mod dispatcher;
mod limiter;
mod pending;
mod stats;

pub use dispatcher::{DispatchSettings, Dispatcher, DispatcherState};
pub use limiter::TokenBucket;
pub use pending::PendingQueries;
pub use stats::{DispatchReport, DispatcherStats};
