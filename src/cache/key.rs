//! Normalized cache key for a DNS question.

use std::fmt;
use std::sync::Arc;

use crate::error::ParseError;

/// Longest query name accepted, in octets.
pub const MAX_NAME_LEN: usize = 255;

/// A case-folded DNS question: name, type and class.
///
/// Two questions that differ only in letter case or a trailing root dot map to
/// the same key. The name is shared, so cloning a key does not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    name: Arc<str>,
    qtype: u16,
    qclass: u16,
}

impl QueryKey {
    /// Build a key from a presentation-form name.
    pub fn new(name: &str, qtype: u16, qclass: u16) -> Result<Self, ParseError> {
        let name = name.strip_suffix('.').unwrap_or(name);
        if name.len() > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        Ok(Self {
            name: Arc::from(name.to_ascii_lowercase()),
            qtype,
            qclass,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub const fn qtype(&self) -> u16 {
        self.qtype
    }

    #[inline]
    pub const fn qclass(&self) -> u16 {
        self.qclass
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.qtype, self.qclass)
    }
}
