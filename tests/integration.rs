//! End-to-end tests for the dispatcher.
//!
//! Frames are built with `hickory-proto` and the crate's own framing, pushed
//! through a scripted port, and the transmitted frames are decoded back.

use std::collections::VecDeque;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, SOA, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use parking_lot::Mutex;
use pnet::util::MacAddr;
use tempfile::NamedTempFile;

use whack::cache::AnswerCache;
use whack::clock::ManualClock;
use whack::config::Config;
use whack::dispatch::{DispatchSettings, Dispatcher};
use whack::dns::WireCodec;
use whack::network::{
    BufferPool, Frame, PacketInfo, PacketIo, PortStats, encode_udp_frame, parse_udp_frame,
};

/// Port fed from a queue of bursts, recording everything transmitted.
struct ScriptedPort {
    pool: BufferPool,
    bursts: Arc<Mutex<VecDeque<Vec<Vec<u8>>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    stats: PortStats,
}

impl ScriptedPort {
    fn new() -> Self {
        Self {
            pool: BufferPool::new(64),
            bursts: Arc::default(),
            sent: Arc::default(),
            stats: PortStats::default(),
        }
    }
}

impl PacketIo for ScriptedPort {
    fn receive_burst(&mut self, _queue_id: u16, max_frames: usize) -> Vec<Frame> {
        let Some(frames) = self.bursts.lock().pop_front() else {
            return Vec::new();
        };
        assert!(frames.len() <= max_frames, "scripted burst too large");

        frames
            .iter()
            .filter_map(|bytes| {
                let frame = self.pool.frame_from(bytes)?;
                self.stats.rx_packets += 1;
                self.stats.rx_bytes += bytes.len() as u64;
                Some(frame)
            })
            .collect()
    }

    fn transmit_burst(&mut self, _queue_id: u16, frames: &[Vec<u8>]) -> usize {
        self.stats.tx_packets += frames.len() as u64;
        self.sent.lock().extend_from_slice(frames);
        frames.len()
    }

    fn stats(&self) -> PortStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = PortStats::default();
    }
}

fn client_v4() -> PacketInfo {
    PacketInfo {
        source_mac: MacAddr::new(0x11, 0x22, 0x33, 0x44, 0x55, 0x66),
        dest_mac: MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
        source_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 23)),
        dest_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        source_port: 51_000,
        dest_port: 53,
    }
}

fn client_v6() -> PacketInfo {
    PacketInfo {
        source_mac: MacAddr::new(0x11, 0x22, 0x33, 0x44, 0x55, 0x66),
        dest_mac: MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
        source_ip: IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0x23)),
        dest_ip: IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)),
        source_port: 51_000,
        dest_port: 53,
    }
}

fn create_query(domain: &str, record_type: RecordType, id: u16) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_ascii(domain).unwrap(), record_type));
    message
}

fn create_response(query: &Message, answers: Vec<Record>) -> Message {
    let mut response = query.clone();
    response
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_response_code(ResponseCode::NoError)
        .add_answers(answers);
    response
}

fn query_frame(info: &PacketInfo, message: &Message) -> Vec<u8> {
    encode_udp_frame(info, &message.to_bytes().unwrap()).unwrap()
}

fn response_frame(info: &PacketInfo, message: &Message) -> Vec<u8> {
    encode_udp_frame(&info.reversed(), &message.to_bytes().unwrap()).unwrap()
}

struct Harness {
    dispatcher: Dispatcher<ScriptedPort, WireCodec, ManualClock>,
    bursts: Arc<Mutex<VecDeque<Vec<Vec<u8>>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    clock: ManualClock,
}

impl Harness {
    fn new(capacity: usize) -> Self {
        let port = ScriptedPort::new();
        let bursts = Arc::clone(&port.bursts);
        let sent = Arc::clone(&port.sent);
        let clock = ManualClock::default();
        let cache = AnswerCache::new(NonZeroUsize::new(capacity).unwrap(), Duration::from_secs(3600));
        let settings = DispatchSettings {
            idle_pause: Duration::ZERO,
            ..DispatchSettings::default()
        };

        Self {
            dispatcher: Dispatcher::new(port, WireCodec, clock.clone(), cache, settings),
            bursts,
            sent,
            clock,
        }
    }

    fn deliver(&mut self, frames: Vec<Vec<u8>>) {
        self.bursts.lock().push_back(frames);
        self.dispatcher.poll_burst();
    }

    /// Query that misses, followed by the resolver's answer.
    fn learn(&mut self, info: &PacketInfo, query: &Message, response: &Message) {
        self.deliver(vec![query_frame(info, query), response_frame(info, response)]);
    }

    fn sent_messages(&self) -> Vec<(PacketInfo, Message)> {
        self.sent
            .lock()
            .iter()
            .map(|frame| {
                let (info, payload) = parse_udp_frame(frame).unwrap();
                (info, Message::from_bytes(payload).unwrap())
            })
            .collect()
    }
}

fn a_record(domain: &str, ttl: u32, ip: Ipv4Addr) -> Record {
    Record::from_rdata(Name::from_str(domain).unwrap(), ttl, RData::A(A(ip)))
}

#[test]
fn should_answer_repeat_query_from_cache() {
    let mut harness = Harness::new(16);
    let info = client_v4();
    let query = create_query("www.example.com", RecordType::A, 100);
    let answer = a_record("www.example.com", 300, Ipv4Addr::new(93, 184, 216, 34));
    let response = create_response(&query, vec![answer]);
    harness.learn(&info, &query, &response);

    harness.clock.advance(Duration::from_secs(10));
    let repeat = create_query("WWW.Example.com", RecordType::A, 555);
    harness.deliver(vec![query_frame(&info, &repeat)]);

    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    let (reply_info, reply) = &sent[0];
    assert_eq!(*reply_info, info.reversed());
    assert_eq!(reply.id(), 555);
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.queries()[0].name().to_ascii(), "WWW.Example.com.");
    assert_eq!(
        reply.answers()[0].data().as_a(),
        Some(&A(Ipv4Addr::new(93, 184, 216, 34)))
    );
}

#[test]
fn should_answer_over_ipv6() {
    let mut harness = Harness::new(16);
    let info = client_v6();
    let query = create_query("v6.example.com", RecordType::AAAA, 7);
    let address = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
    let response = create_response(
        &query,
        vec![Record::from_rdata(
            Name::from_str("v6.example.com").unwrap(),
            120,
            RData::AAAA(AAAA(address)),
        )],
    );
    harness.learn(&info, &query, &response);

    harness.deliver(vec![query_frame(&info, &create_query("v6.example.com", RecordType::AAAA, 8))]);

    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, info.reversed());
    assert_eq!(sent[0].1.id(), 8);
    assert_eq!(sent[0].1.answers()[0].data().as_aaaa(), Some(&AAAA(address)));
}

#[test]
fn should_keep_record_types_apart() {
    let mut harness = Harness::new(16);
    let info = client_v4();
    let query = create_query("example.com", RecordType::A, 1);
    let response = create_response(&query, vec![a_record("example.com", 300, Ipv4Addr::LOCALHOST)]);
    harness.learn(&info, &query, &response);

    harness.deliver(vec![query_frame(&info, &create_query("example.com", RecordType::AAAA, 2))]);

    assert!(harness.sent_messages().is_empty());
    assert_eq!(harness.dispatcher.cache().miss_count(), 2);
}

#[test]
fn should_cache_negative_answer_for_soa_minimum() {
    let mut harness = Harness::new(16);
    let info = client_v4();
    let query = create_query("missing.example.com", RecordType::A, 40);
    let mut response = create_response(&query, Vec::new());
    response
        .set_response_code(ResponseCode::NXDomain)
        .add_name_server(Record::from_rdata(
            Name::from_str("example.com").unwrap(),
            3600,
            RData::SOA(SOA::new(
                Name::from_str("ns.example.com").unwrap(),
                Name::from_str("hostmaster.example.com").unwrap(),
                2024_01_01,
                7200,
                900,
                86_400,
                30,
            )),
        ));
    harness.learn(&info, &query, &response);

    harness.clock.advance(Duration::from_secs(29));
    harness.deliver(vec![query_frame(&info, &create_query("missing.example.com", RecordType::A, 41))]);
    harness.clock.advance(Duration::from_secs(1));
    harness.deliver(vec![query_frame(&info, &create_query("missing.example.com", RecordType::A, 42))]);

    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.id(), 41);
    assert_eq!(sent[0].1.response_code(), ResponseCode::NXDomain);
}

#[test]
fn should_reject_oversized_answer() {
    let mut harness = Harness::new(16);
    let info = client_v4();
    let query = create_query("big.example.com", RecordType::TXT, 9);
    let chunk = "x".repeat(200);
    let response = create_response(
        &query,
        (0..3)
            .map(|_| {
                Record::from_rdata(
                    Name::from_str("big.example.com").unwrap(),
                    300,
                    RData::TXT(TXT::new(vec![chunk.clone()])),
                )
            })
            .collect(),
    );
    harness.learn(&info, &query, &response);

    let stats = harness.dispatcher.stats();
    assert_eq!(stats.rejected_payloads, 1);
    assert_eq!(stats.responses_cached, 0);
    assert!(harness.dispatcher.cache().is_empty());
}

#[test]
fn should_evict_soonest_expiring_answer_when_full() {
    let mut harness = Harness::new(2);
    let info = client_v4();
    let answers = [
        ("short.example.com", 30),
        ("long.example.com", 600),
        ("new.example.com", 300),
    ];
    for (id, (domain, ttl)) in (1u16..).zip(answers) {
        let query = create_query(domain, RecordType::A, id);
        let response = create_response(&query, vec![a_record(domain, ttl, Ipv4Addr::LOCALHOST)]);
        harness.learn(&info, &query, &response);
    }
    assert_eq!(harness.dispatcher.cache().len(), 2);

    harness.deliver(vec![
        query_frame(&info, &create_query("short.example.com", RecordType::A, 10)),
        query_frame(&info, &create_query("long.example.com", RecordType::A, 11)),
        query_frame(&info, &create_query("new.example.com", RecordType::A, 12)),
    ]);

    let ids: Vec<u16> = harness.sent_messages().iter().map(|(_, message)| message.id()).collect();
    assert_eq!(ids, vec![11, 12]);
}

#[test]
fn should_configure_dispatcher_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r"
cache_capacity = 4
cache_ttl_seconds = 120
cleanup_interval_seconds = 5
burst_size = 8
rate_limit = 0
buffer_pool_size = 16
"
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    let settings = DispatchSettings::from_config(&config, 0);
    assert_eq!(settings.burst_size, 8);
    assert_eq!(settings.cleanup_interval, Duration::from_secs(5));
    assert_eq!(settings.rate_limit, 0);

    let cache = AnswerCache::new(config.capacity(), config.default_ttl());
    assert_eq!(cache.capacity().get(), 4);
    assert_eq!(cache.default_ttl(), Duration::from_secs(120));
}

#[tokio::test]
async fn should_stop_and_report_when_running_flag_clears() {
    let port = ScriptedPort::new();
    let bursts = Arc::clone(&port.bursts);
    let sent = Arc::clone(&port.sent);
    let info = client_v4();
    let query = create_query("example.com", RecordType::A, 1);
    let response = create_response(&query, vec![a_record("example.com", 300, Ipv4Addr::LOCALHOST)]);
    bursts.lock().push_back(vec![query_frame(&info, &query), response_frame(&info, &response)]);
    bursts
        .lock()
        .push_back(vec![query_frame(&info, &create_query("example.com", RecordType::A, 2))]);

    let cache = AnswerCache::new(NonZeroUsize::new(8).unwrap(), Duration::from_secs(60));
    let settings = DispatchSettings {
        idle_pause: Duration::from_millis(1),
        ..DispatchSettings::default()
    };
    let dispatcher = Dispatcher::new(port, WireCodec, ManualClock::default(), cache, settings);

    let running = Arc::new(AtomicBool::new(true));
    let worker_running = Arc::clone(&running);
    let worker = tokio::task::spawn_blocking(move || dispatcher.run(&worker_running));

    tokio::time::timeout(Duration::from_secs(5), async {
        while sent.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    running.store(false, Ordering::SeqCst);

    let report = worker.await.unwrap();
    assert_eq!(report.dispatcher.rx_packets, 3);
    assert_eq!(report.dispatcher.responses_cached, 1);
    assert_eq!(report.dispatcher.tx_packets, 1);
    assert_eq!(report.cache.hits, 1);
    assert_eq!(report.cache.misses, 1);
    assert!(report.to_string().contains("Hit ratio: 50.00%"));
}
