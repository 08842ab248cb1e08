//! DNS frame classification and response construction.
//!
//! The codec is the only place that understands the DNS wire format. The
//! cache treats answers as opaque bytes and the dispatcher only sees
//! [`DnsFrame`]s.

use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{RData, Record};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

use crate::cache::QueryKey;
use crate::error::{EncodeError, ParseError};
use crate::network::{PacketInfo, encode_udp_frame, parse_udp_frame};

/// Well-known DNS port.
pub const DNS_PORT: u16 = 53;

/// A response as seen on the wire, with what the cache needs to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub rcode: ResponseCode,
    pub truncated: bool,
    /// Lowest answer TTL, or the SOA negative TTL when there are no answers.
    pub ttl: Option<u32>,
    /// The full DNS message, as received.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Query,
    Response(ResponseMeta),
}

/// A classified DNS frame.
#[derive(Debug, Clone)]
pub struct DnsFrame {
    pub info: PacketInfo,
    /// Transaction ID.
    pub id: u16,
    pub key: QueryKey,
    /// The question exactly as it appeared, letter case included.
    pub question: Query,
    pub kind: MessageKind,
}

impl DnsFrame {
    pub const fn is_query(&self) -> bool {
        matches!(self.kind, MessageKind::Query)
    }

    /// Whether this is a response worth caching: a complete `NoError` or
    /// `NXDomain` answer whose TTL is not zero.
    pub fn is_cacheable(&self) -> bool {
        match &self.kind {
            MessageKind::Response(meta) => {
                matches!(meta.rcode, ResponseCode::NoError | ResponseCode::NXDomain)
                    && !meta.truncated
                    && meta.ttl != Some(0)
            }
            MessageKind::Query => false,
        }
    }

    /// TTL carried by the response itself, if any.
    pub fn answer_ttl(&self) -> Option<Duration> {
        match &self.kind {
            MessageKind::Response(meta) => meta.ttl.map(|ttl| Duration::from_secs(u64::from(ttl))),
            MessageKind::Query => None,
        }
    }
}

/// Trait for DNS wire handling.
pub trait DnsCodec: Send {
    /// Classify a raw Ethernet frame.
    fn extract(&self, frame: &[u8]) -> Result<DnsFrame, ParseError>;

    /// Build the frame answering `query` from a cached response payload.
    fn build_response(&self, query: &DnsFrame, payload: &[u8]) -> Result<Vec<u8>, EncodeError>;
}

/// Production codec: `pnet` for the lower layers, `hickory-proto` for DNS.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl DnsCodec for WireCodec {
    fn extract(&self, frame: &[u8]) -> Result<DnsFrame, ParseError> {
        let (info, payload) = parse_udp_frame(frame)?;
        if info.source_port != DNS_PORT && info.dest_port != DNS_PORT {
            return Err(ParseError::NotDns);
        }

        let message =
            Message::from_bytes(payload).map_err(|_| ParseError::Malformed { layer: "dns" })?;
        let question = message.queries().first().ok_or(ParseError::NoQuestion)?;
        let key = QueryKey::new(
            &question.name().to_ascii(),
            u16::from(question.query_type()),
            u16::from(question.query_class()),
        )?;

        let kind = match message.message_type() {
            MessageType::Query => MessageKind::Query,
            MessageType::Response => MessageKind::Response(ResponseMeta {
                rcode: message.response_code(),
                truncated: message.truncated(),
                ttl: response_ttl(&message),
                payload: payload.to_vec(),
            }),
        };

        Ok(DnsFrame {
            info,
            id: message.id(),
            key,
            question: question.clone(),
            kind,
        })
    }

    fn build_response(&self, query: &DnsFrame, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let mut response = Message::from_bytes(payload)?;
        response.set_id(query.id);
        response.take_queries();
        response.add_query(query.question.clone());

        let bytes = response.to_bytes()?;
        encode_udp_frame(&query.info.reversed(), &bytes)
    }
}

/// Lowest TTL among the answers. Without answers, the negative-caching TTL
/// from the authority SOA: the smaller of its own TTL and its MINIMUM field.
fn response_ttl(message: &Message) -> Option<u32> {
    message.answers().iter().map(Record::ttl).min().or_else(|| {
        message
            .name_servers()
            .iter()
            .find_map(|record| match record.data() {
                RData::SOA(soa) => Some(record.ttl().min(soa.minimum())),
                _ => None,
            })
    })
}
