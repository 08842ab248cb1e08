//! The per-queue receive/classify/answer loop.
//!
//! A dispatcher owns its port queue, its answer cache and its counters. Each
//! burst is processed to completion before the next one is pulled, and the
//! only thing shared with the outside is the `running` flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ::metrics::{Counter, Gauge, counter, gauge};
use tracing::{debug, info, instrument, trace};

use super::limiter::TokenBucket;
use super::pending::PendingQueries;
use super::stats::{DispatchReport, DispatcherStats};
use crate::cache::AnswerCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::dns::{DnsCodec, DnsFrame, MessageKind};
use crate::error::ParseError;
use crate::metrics as names;
use crate::network::{Frame, PacketIo};

/// Settings for one dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub queue_id: u16,
    pub burst_size: usize,
    pub cleanup_interval: Duration,
    /// Sleep after an empty burst. Zero spins.
    pub idle_pause: Duration,
    /// Queries per second looked up in the cache. 0 disables the gate.
    pub rate_limit: u32,
    pub pending_capacity: u64,
    pub pending_timeout: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &Config, queue_id: u16) -> Self {
        Self {
            queue_id,
            burst_size: config.burst_size,
            cleanup_interval: config.cleanup_interval(),
            idle_pause: config.idle_pause(),
            rate_limit: config.rate_limit,
            pending_capacity: config.pending_capacity,
            pending_timeout: config.pending_timeout(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Draining,
    Stopped,
}

/// Metric handles, registered once per dispatcher.
struct DispatchMetrics {
    frames_received: Counter,
    rate_limited: Counter,
    parse_errors: Counter,
    cache_hits: Counter,
    cache_misses: Counter,
    responses_sent: Counter,
    responses_dropped: Counter,
    answers_cached: Counter,
    swept_entries: Counter,
    cache_entries: Gauge,
}

impl DispatchMetrics {
    fn new(queue_id: u16) -> Self {
        let queue = queue_id.to_string();
        Self {
            frames_received: counter!(names::FRAMES_RECEIVED, "queue" => queue.clone()),
            rate_limited: counter!(names::QUERIES_RATE_LIMITED, "queue" => queue.clone()),
            parse_errors: counter!(names::PARSE_ERRORS, "queue" => queue.clone()),
            cache_hits: counter!(names::CACHE_HITS, "queue" => queue.clone()),
            cache_misses: counter!(names::CACHE_MISSES, "queue" => queue.clone()),
            responses_sent: counter!(names::RESPONSES_SENT, "queue" => queue.clone()),
            responses_dropped: counter!(names::RESPONSES_DROPPED, "queue" => queue.clone()),
            answers_cached: counter!(names::ANSWERS_CACHED, "queue" => queue.clone()),
            swept_entries: counter!(names::SWEPT_ENTRIES, "queue" => queue.clone()),
            cache_entries: gauge!(names::CACHE_ENTRIES, "queue" => queue),
        }
    }
}

/// Receives bursts from one port queue, answers cache hits and learns
/// solicited responses.
pub struct Dispatcher<P, D, C>
where
    P: PacketIo,
    D: DnsCodec,
    C: Clock,
{
    port: P,
    codec: D,
    clock: C,
    cache: AnswerCache,
    pending: PendingQueries,
    limiter: Option<TokenBucket>,
    settings: DispatchSettings,
    state: DispatcherState,
    stats: DispatcherStats,
    metrics: DispatchMetrics,
    last_sweep: Instant,
    outgoing: Vec<Vec<u8>>,
}

impl<P, D, C> Dispatcher<P, D, C>
where
    P: PacketIo,
    D: DnsCodec,
    C: Clock,
{
    pub fn new(port: P, codec: D, clock: C, cache: AnswerCache, settings: DispatchSettings) -> Self {
        let now = clock.now();
        let limiter = (settings.rate_limit > 0).then(|| TokenBucket::new(settings.rate_limit, now));

        Self {
            pending: PendingQueries::new(settings.pending_capacity, settings.pending_timeout),
            metrics: DispatchMetrics::new(settings.queue_id),
            outgoing: Vec::with_capacity(settings.burst_size),
            port,
            codec,
            clock,
            cache,
            limiter,
            settings,
            state: DispatcherState::Running,
            stats: DispatcherStats::default(),
            last_sweep: now,
        }
    }

    pub const fn state(&self) -> DispatcherState {
        self.state
    }

    pub const fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    pub const fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    pub const fn port(&self) -> &P {
        &self.port
    }

    pub const fn pending(&self) -> &PendingQueries {
        &self.pending
    }

    /// Poll until `running` is cleared, then drain and stop.
    #[instrument(skip_all, fields(queue = self.settings.queue_id))]
    pub fn run(mut self, running: &AtomicBool) -> DispatchReport {
        info!(
            burst_size = self.settings.burst_size,
            capacity = self.cache.capacity().get(),
            "dispatcher running"
        );

        while running.load(Ordering::SeqCst) {
            if self.poll_burst() == 0 && !self.settings.idle_pause.is_zero() {
                std::thread::sleep(self.settings.idle_pause);
            }
        }

        self.drain();
        self.finish()
    }

    /// Pull and process one burst. Returns the number of frames received.
    ///
    /// Does nothing once the dispatcher is draining.
    pub fn poll_burst(&mut self) -> usize {
        if self.state != DispatcherState::Running {
            return 0;
        }

        let burst = self
            .port
            .receive_burst(self.settings.queue_id, self.settings.burst_size);
        let received = burst.len();

        if received > 0 {
            let now = self.clock.now();
            for frame in burst {
                self.process_frame(&frame, now);
            }
            self.flush();
        }

        self.maybe_sweep(self.clock.now());
        received
    }

    /// Stop pulling new bursts.
    pub fn drain(&mut self) {
        if self.state == DispatcherState::Running {
            debug!(queue = self.settings.queue_id, "draining");
            self.state = DispatcherState::Draining;
        }
    }

    /// Stop the dispatcher, release its cache and report what it did.
    pub fn finish(mut self) -> DispatchReport {
        self.drain();
        self.state = DispatcherState::Stopped;

        let report = DispatchReport {
            queue_id: self.settings.queue_id,
            dispatcher: self.stats,
            port: self.port.stats(),
            cache: self.cache.stats(),
        };

        info!(
            queue = report.queue_id,
            rx = report.dispatcher.rx_packets,
            tx = report.dispatcher.tx_packets,
            hits = report.cache.hits,
            misses = report.cache.misses,
            hit_ratio = report.cache.hit_ratio,
            "dispatcher stopped"
        );

        self.cache.destroy();
        report
    }

    fn process_frame(&mut self, frame: &Frame, now: Instant) {
        self.stats.rx_packets += 1;
        self.stats.rx_bytes += frame.len() as u64;
        self.metrics.frames_received.increment(1);

        let dns = match self.codec.extract(frame.as_slice()) {
            Ok(dns) => dns,
            Err(ParseError::NotDns) => {
                self.stats.ignored_frames += 1;
                return;
            }
            Err(err) => {
                self.stats.parse_errors += 1;
                self.metrics.parse_errors.increment(1);
                trace!("dropping frame: {err}");
                return;
            }
        };

        if dns.is_query() {
            if let Some(limiter) = &mut self.limiter
                && !limiter.try_acquire(now)
            {
                self.stats.rate_limited += 1;
                self.metrics.rate_limited.increment(1);
                return;
            }
            self.answer_query(&dns, now);
        } else {
            self.learn_response(dns, now);
        }
    }

    fn answer_query(&mut self, query: &DnsFrame, now: Instant) {
        let Some(payload) = self.cache.lookup(&query.key, now) else {
            self.metrics.cache_misses.increment(1);
            trace!(key = %query.key, id = query.id, "cache miss");
            self.pending.record(query.key.clone(), query.id, now);
            return;
        };

        self.metrics.cache_hits.increment(1);
        match self.codec.build_response(query, payload) {
            Ok(response) => self.outgoing.push(response),
            Err(err) => {
                self.stats.encode_errors += 1;
                debug!(key = %query.key, "failed to build response: {err}");
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn learn_response(&mut self, response: DnsFrame, now: Instant) {
        if !self.pending.complete(&response.key, response.id, now) {
            self.stats.unsolicited_responses += 1;
            return;
        }
        if !response.is_cacheable() {
            self.stats.uncacheable_responses += 1;
            return;
        }

        let ttl = response.answer_ttl();
        let MessageKind::Response(meta) = response.kind else {
            return;
        };

        let key = response.key;
        match self.cache.insert(key.clone(), meta.payload, ttl, now) {
            Ok(()) => {
                self.stats.responses_cached += 1;
                self.metrics.answers_cached.increment(1);
                self.metrics.cache_entries.set(self.cache.len() as f64);
                trace!(%key, ?ttl, "answer cached");
            }
            Err(err) => {
                self.stats.rejected_payloads += 1;
                debug!(%key, "answer not cached: {err}");
            }
        }
    }

    /// Transmit this burst's responses in one call.
    fn flush(&mut self) {
        if self.outgoing.is_empty() {
            return;
        }

        let submitted = self.outgoing.len();
        let accepted = self
            .port
            .transmit_burst(self.settings.queue_id, &self.outgoing)
            .min(submitted);
        let dropped = submitted - accepted;

        self.stats.tx_packets += accepted as u64;
        self.stats.tx_bytes += self.outgoing[..accepted]
            .iter()
            .map(|frame| frame.len() as u64)
            .sum::<u64>();
        self.stats.tx_dropped += dropped as u64;
        self.metrics.responses_sent.increment(accepted as u64);

        if dropped > 0 {
            self.metrics.responses_dropped.increment(dropped as u64);
            debug!(submitted, dropped, "transmit shortfall");
        }

        self.outgoing.clear();
    }

    #[allow(clippy::cast_precision_loss)]
    fn maybe_sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.settings.cleanup_interval {
            return;
        }

        let removed = self.cache.sweep(now);
        self.last_sweep = now;
        self.stats.sweeps += 1;
        self.stats.swept_entries += removed as u64;
        self.metrics.swept_entries.increment(removed as u64);
        self.metrics.cache_entries.set(self.cache.len() as f64);

        debug!(removed, remaining = self.cache.len(), "expired entries swept");
    }
}
