//! Counters kept by a dispatcher and the report it returns when stopped.

use std::fmt;

use crate::cache::CacheStats;
use crate::network::PortStats;

/// Counters owned by one dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    /// Frames that looked like DNS but could not be decoded.
    pub parse_errors: u64,
    /// Frames that are not DNS over UDP.
    pub ignored_frames: u64,
    /// Cache hits whose response frame could not be built.
    pub encode_errors: u64,
    pub tx_dropped: u64,
    pub rate_limited: u64,
    pub responses_cached: u64,
    /// Responses refused by the cache, e.g. oversized payloads.
    pub rejected_payloads: u64,
    /// Responses matching no outstanding query.
    pub unsolicited_responses: u64,
    /// Solicited responses that were not worth caching.
    pub uncacheable_responses: u64,
    pub sweeps: u64,
    pub swept_entries: u64,
}

impl fmt::Display for DispatcherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dispatcher statistics:")?;
        writeln!(f, "  RX packets:            {}", self.rx_packets)?;
        writeln!(f, "  RX bytes:              {}", self.rx_bytes)?;
        writeln!(f, "  TX packets:            {}", self.tx_packets)?;
        writeln!(f, "  TX bytes:              {}", self.tx_bytes)?;
        writeln!(f, "  TX dropped:            {}", self.tx_dropped)?;
        writeln!(f, "  Parse errors:          {}", self.parse_errors)?;
        writeln!(f, "  Ignored frames:        {}", self.ignored_frames)?;
        writeln!(f, "  Encode errors:         {}", self.encode_errors)?;
        writeln!(f, "  Rate limited:          {}", self.rate_limited)?;
        writeln!(f, "  Responses cached:      {}", self.responses_cached)?;
        writeln!(f, "  Rejected payloads:     {}", self.rejected_payloads)?;
        writeln!(f, "  Unsolicited responses: {}", self.unsolicited_responses)?;
        writeln!(f, "  Uncacheable responses: {}", self.uncacheable_responses)?;
        write!(
            f,
            "  Sweeps:                {} ({} entries)",
            self.sweeps, self.swept_entries
        )
    }
}

/// Final statistics of a stopped dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchReport {
    pub queue_id: u16,
    pub dispatcher: DispatcherStats,
    pub port: PortStats,
    pub cache: CacheStats,
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue {}", self.queue_id)?;
        writeln!(f, "{}", self.port)?;
        writeln!(f, "{}", self.dispatcher)?;
        write!(f, "{}", self.cache)
    }
}
