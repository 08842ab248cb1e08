//! DNS wire handling.

mod codec;

pub use codec::{DNS_PORT, DnsCodec, DnsFrame, MessageKind, ResponseMeta, WireCodec};

#[cfg(test)]
pub(crate) use codec::tests as codec_tests;
