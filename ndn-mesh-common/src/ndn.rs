//! NDN names and packets.
//!
//! Names travel on the wire inside ControlParameters and status datasets, so
//! they carry a TLV encoding. Interest and Data are plain values handed to
//! the transport, which owns their packet format.

use crate::error::Error;
use crate::tlv::{self, TlvDecoder, TlvEncoder};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(test)]
mod tests;

/// Marker byte that opens a segment number component.
pub const SEGMENT_MARKER: u8 = 0x00;

/// Default Interest lifetime used when none is given.
pub const DEFAULT_INTEREST_LIFETIME_MS: u64 = 4000;

static NONCE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Represents an NDN name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    /// Creates a new name component from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the component as bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Builds a segment component: the marker byte followed by the segment
    /// number in big endian without leading zero bytes.
    pub fn from_segment(segment: u64) -> Self {
        let be = segment.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count().min(be.len() - 1);
        let mut value = Vec::with_capacity(1 + be.len() - skip);
        value.push(SEGMENT_MARKER);
        value.extend_from_slice(&be[skip..]);
        Self(Bytes::from(value))
    }

    /// Returns true if this component carries the segment marker.
    pub fn is_segment(&self) -> bool {
        (2..=9).contains(&self.0.len()) && self.0[0] == SEGMENT_MARKER
    }

    /// Parses the segment number out of a segment component.
    pub fn to_segment(&self) -> Result<u64, Error> {
        if !self.is_segment() {
            return Err(Error::Encoding(format!(
                "Name component {} is not a segment number",
                self
            )));
        }
        Ok(self.0[1..].iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// URI form of the component, percent‑escaping everything outside the
    /// unreserved set.
    pub fn to_escaped_string(&self) -> String {
        if self.0.iter().all(|b| *b == b'.') {
            // "", ".", ".." are written with three extra periods
            return format!("...{}", ".".repeat(self.0.len()));
        }

        let mut out = String::with_capacity(self.0.len());
        for &b in self.0.iter() {
            if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.' | b'_') {
                out.push(b as char);
            } else {
                out.push_str(&format!("%{:02X}", b));
            }
        }
        out
    }

    /// Parses one escaped URI component.
    pub fn from_escaped_string(s: &str) -> Result<Self, Error> {
        if !s.is_empty() && s.bytes().all(|b| b == b'.') {
            if s.len() < 3 {
                return Err(Error::Encoding(format!(
                    "Illegal name component '{}'",
                    s
                )));
            }
            return Ok(Self::new(vec![b'.'; s.len() - 3]));
        }

        let bytes = s.as_bytes();
        let mut value = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        Error::Encoding(format!("Bad percent escape in component '{}'", s))
                    })?;
                value.push(hex);
                i += 3;
            } else {
                value.push(bytes[i]);
                i += 1;
            }
        }
        Ok(Self::new(value))
    }

    /// Prepends this component as a TLV.
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_blob_tlv(tlv::TLV_COMPONENT, &self.0);
    }

    /// Decodes a name component.
    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let value = decoder.read_blob_tlv(tlv::TLV_COMPONENT)?;
        Ok(Self(Bytes::copy_from_slice(value)))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_escaped_string())
    }
}

impl From<&str> for NameComponent {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

/// Represents an NDN name, which is a sequence of name components.
///
/// Names are values: `append` and friends return a new name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    /// Creates a new empty NDN name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a name from its components.
    pub fn from_components(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    /// Parses an NDN URI such as `/localhop/wifidirect/192.168.49.1`.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        let uri = uri.trim();
        let uri = uri.strip_prefix("ndn:").unwrap_or(uri);
        let path = uri.split(['?', '#']).next().unwrap_or("");

        let components = path
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(NameComponent::from_escaped_string)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }

    /// Returns a new name with `component` appended.
    pub fn append(&self, component: NameComponent) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }

    /// Returns a new name with the literal bytes of `component` appended.
    pub fn append_str(&self, component: &str) -> Self {
        self.append(NameComponent::from(component))
    }

    /// Returns a new name with a segment component appended.
    pub fn append_segment(&self, segment: u64) -> Self {
        self.append(NameComponent::from_segment(segment))
    }

    /// Returns the number of components in the name.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the name components.
    pub fn components(&self) -> &[NameComponent] {
        &self.components
    }

    /// Gets a component at the specified index.
    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Gets a component counted from the end; `get_from_end(1)` is the last one.
    pub fn get_from_end(&self, position: usize) -> Option<&NameComponent> {
        self.components
            .len()
            .checked_sub(position)
            .and_then(|index| self.components.get(index))
    }

    /// Returns a prefix of this name with at most `len` components.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// Checks if this name is a prefix of another name.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// URI representation.
    pub fn to_uri(&self) -> String {
        self.to_string()
    }

    /// Prepends this name as a TLV.
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_NAME, |e| {
            for component in self.components.iter().rev() {
                component.encode(e);
            }
        });
    }

    /// Decodes a name.
    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_NAME)?;
        let mut components = Vec::new();
        while decoder.offset() < end {
            components.push(NameComponent::decode(decoder)?);
        }
        decoder.finish_nested_tlvs(end)?;
        Ok(Self { components })
    }

    /// Encodes this name as a standalone TLV block.
    pub fn wire_encode(&self) -> Bytes {
        let mut encoder = TlvEncoder::new();
        self.encode(&mut encoder);
        encoder.finish()
    }

    /// Decodes a name from a standalone TLV block.
    pub fn wire_decode(input: &[u8]) -> Result<Self, Error> {
        Self::decode(&mut TlvDecoder::new(input))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }

        for component in &self.components {
            write!(f, "/{}", component)?;
        }

        Ok(())
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        Self::from_uri(&uri).map_err(serde::de::Error::custom)
    }
}

/// Which child to prefer when several Data packets match an Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildSelector {
    Leftmost,
    Rightmost,
}

/// Represents an NDN Interest packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    /// The name requested in the Interest.
    pub name: Name,

    /// A nonce value to prevent looping.
    pub nonce: u32,

    /// Interest lifetime in milliseconds.
    pub lifetime_ms: u64,

    /// Whether this Interest can be satisfied by Data with a longer name.
    pub can_be_prefix: bool,

    /// Whether cached Data must still be fresh.
    pub must_be_fresh: bool,

    /// Preferred child among matching Data.
    pub child_selector: Option<ChildSelector>,
}

impl Interest {
    /// Creates a new Interest packet.
    pub fn new(name: Name) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        let nonce = (now.as_millis() as u32).wrapping_mul(2_654_435_761)
            ^ NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self {
            name,
            nonce,
            lifetime_ms: DEFAULT_INTEREST_LIFETIME_MS,
            can_be_prefix: false,
            must_be_fresh: false,
            child_selector: None,
        }
    }

    /// Sets the Interest lifetime.
    pub fn with_lifetime(mut self, lifetime_ms: u64) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    /// Sets the nonce value.
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the can_be_prefix flag.
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    /// Sets the must_be_fresh flag.
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Sets the child selector.
    pub fn with_child_selector(mut self, child_selector: ChildSelector) -> Self {
        self.child_selector = Some(child_selector);
        self
    }

    /// Interest lifetime as a [`Duration`].
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }

    /// Whether `data` satisfies this Interest.
    ///
    /// Management responses (versioned datasets, signed command replies)
    /// carry names longer than the Interest, so any Data under the Interest
    /// name matches.
    pub fn matches_data(&self, data: &Data) -> bool {
        self.name.is_prefix_of(&data.name)
    }
}

/// Represents an NDN Data packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// The name of the Data packet.
    pub name: Name,

    /// The content of the Data packet.
    pub content: Bytes,

    /// How long the Data stays fresh in caches.
    pub freshness_period_ms: Option<u64>,

    /// Last segment of a segmented object.
    #[serde(skip)]
    pub final_block_id: Option<NameComponent>,
}

impl Data {
    /// Creates a new Data packet.
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_period_ms: None,
            final_block_id: None,
        }
    }

    /// Sets the freshness period.
    pub fn with_freshness_period(mut self, freshness_period_ms: u64) -> Self {
        self.freshness_period_ms = Some(freshness_period_ms);
        self
    }

    /// Sets the FinalBlockId.
    pub fn with_final_block_id(mut self, final_block_id: NameComponent) -> Self {
        self.final_block_id = Some(final_block_id);
        self
    }
}
