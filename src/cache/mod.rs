//! Answer caching with TTL expiry and bounded capacity.

mod answer;
mod key;

pub use answer::{AnswerCache, CacheStats, MAX_PAYLOAD_SIZE, MAX_TTL};
pub use key::{MAX_NAME_LEN, QueryKey};
