//! Status dataset records published by the forwarder.

use crate::control::ForwardingFlags;
use crate::error::Error;
use crate::ndn::Name;
use crate::tlv::{self, TlvDecoder, TlvEncoder};
use bytes::Bytes;
use serde::Serialize;

macro_rules! numeric_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn number(self) -> u64 {
                self as u64
            }

            pub fn from_number(value: u64) -> Result<Self, Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(Error::Encoding(format!(
                        concat!("Unknown ", stringify!($name), " value {}"),
                        other
                    ))),
                }
            }
        }
    };
}

numeric_enum!(
    /// Whether a face reaches the local host only.
    FaceScope { NonLocal = 0, Local = 1 }
);

numeric_enum!(
    /// Lifetime policy of a face.
    FacePersistency { Persistent = 0, OnDemand = 1, Permanent = 2 }
);

numeric_enum!(
    /// Link layer shape of a face.
    LinkType { PointToPoint = 0, MultiAccess = 1 }
);

/// One entry of the `faces/list` dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceStatus {
    pub face_id: u64,
    pub uri: String,
    pub local_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_period: Option<u64>,
    pub face_scope: FaceScope,
    pub face_persistency: FacePersistency,
    pub link_type: LinkType,
    pub in_interests: u64,
    pub in_datas: u64,
    pub in_nacks: u64,
    pub out_interests: u64,
    pub out_datas: u64,
    pub out_nacks: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
}

impl FaceStatus {
    /// A face with zeroed counters.
    pub fn new(face_id: u64, uri: impl Into<String>, local_uri: impl Into<String>) -> Self {
        Self {
            face_id,
            uri: uri.into(),
            local_uri: local_uri.into(),
            expiration_period: None,
            face_scope: FaceScope::NonLocal,
            face_persistency: FacePersistency::Persistent,
            link_type: LinkType::PointToPoint,
            in_interests: 0,
            in_datas: 0,
            in_nacks: 0,
            out_interests: 0,
            out_datas: 0,
            out_nacks: 0,
            in_bytes: 0,
            out_bytes: 0,
        }
    }

    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_FACE_STATUS, |e| {
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_OUT_BYTES, self.out_bytes);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_IN_BYTES, self.in_bytes);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_OUT_NACKS, self.out_nacks);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_OUT_DATAS, self.out_datas);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_OUT_INTERESTS, self.out_interests);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_IN_NACKS, self.in_nacks);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_IN_DATAS, self.in_datas);
            e.prepend_non_negative_integer_tlv(tlv::TLV_N_IN_INTERESTS, self.in_interests);
            e.prepend_non_negative_integer_tlv(tlv::TLV_LINK_TYPE, self.link_type.number());
            e.prepend_non_negative_integer_tlv(
                tlv::TLV_FACE_PERSISTENCY,
                self.face_persistency.number(),
            );
            e.prepend_non_negative_integer_tlv(tlv::TLV_FACE_SCOPE, self.face_scope.number());
            e.prepend_optional_non_negative_integer_tlv(
                tlv::TLV_EXPIRATION_PERIOD,
                self.expiration_period,
            );
            e.prepend_blob_tlv(tlv::TLV_LOCAL_URI, self.local_uri.as_bytes());
            e.prepend_blob_tlv(tlv::TLV_URI, self.uri.as_bytes());
            e.prepend_non_negative_integer_tlv(tlv::TLV_FACE_ID, self.face_id);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_FACE_STATUS)?;

        let status = Self {
            face_id: decoder.read_non_negative_integer_tlv(tlv::TLV_FACE_ID)?,
            uri: decoder.read_string_tlv(tlv::TLV_URI)?,
            local_uri: decoder.read_string_tlv(tlv::TLV_LOCAL_URI)?,
            expiration_period: decoder
                .read_optional_non_negative_integer_tlv(tlv::TLV_EXPIRATION_PERIOD, end)?,
            face_scope: FaceScope::from_number(
                decoder.read_non_negative_integer_tlv(tlv::TLV_FACE_SCOPE)?,
            )?,
            face_persistency: FacePersistency::from_number(
                decoder.read_non_negative_integer_tlv(tlv::TLV_FACE_PERSISTENCY)?,
            )?,
            link_type: LinkType::from_number(
                decoder.read_non_negative_integer_tlv(tlv::TLV_LINK_TYPE)?,
            )?,
            in_interests: decoder.read_non_negative_integer_tlv(tlv::TLV_N_IN_INTERESTS)?,
            in_datas: decoder.read_non_negative_integer_tlv(tlv::TLV_N_IN_DATAS)?,
            in_nacks: decoder.read_non_negative_integer_tlv(tlv::TLV_N_IN_NACKS)?,
            out_interests: decoder.read_non_negative_integer_tlv(tlv::TLV_N_OUT_INTERESTS)?,
            out_datas: decoder.read_non_negative_integer_tlv(tlv::TLV_N_OUT_DATAS)?,
            out_nacks: decoder.read_non_negative_integer_tlv(tlv::TLV_N_OUT_NACKS)?,
            in_bytes: decoder.read_non_negative_integer_tlv(tlv::TLV_N_IN_BYTES)?,
            out_bytes: decoder.read_non_negative_integer_tlv(tlv::TLV_N_OUT_BYTES)?,
        };

        decoder.finish_nested_tlvs(end)?;
        Ok(status)
    }
}

/// One route of a RIB entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub face_id: u64,
    pub origin: u64,
    pub cost: u64,
    pub flags: ForwardingFlags,
    /// `None` means the route never expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_period: Option<u64>,
}

impl Route {
    pub fn new(face_id: u64, origin: u64, cost: u64, flags: ForwardingFlags) -> Self {
        Self {
            face_id,
            origin,
            cost,
            flags,
            expiration_period: None,
        }
    }

    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_ROUTE, |e| {
            e.prepend_optional_non_negative_integer_tlv(
                tlv::TLV_EXPIRATION_PERIOD,
                self.expiration_period,
            );
            e.prepend_non_negative_integer_tlv(tlv::TLV_FLAGS, self.flags.bits());
            e.prepend_non_negative_integer_tlv(tlv::TLV_COST, self.cost);
            e.prepend_non_negative_integer_tlv(tlv::TLV_ORIGIN, self.origin);
            e.prepend_non_negative_integer_tlv(tlv::TLV_FACE_ID, self.face_id);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_ROUTE)?;
        let route = Self {
            face_id: decoder.read_non_negative_integer_tlv(tlv::TLV_FACE_ID)?,
            origin: decoder.read_non_negative_integer_tlv(tlv::TLV_ORIGIN)?,
            cost: decoder.read_non_negative_integer_tlv(tlv::TLV_COST)?,
            flags: ForwardingFlags::from_bits(decoder.read_non_negative_integer_tlv(tlv::TLV_FLAGS)?)?,
            expiration_period: decoder
                .read_optional_non_negative_integer_tlv(tlv::TLV_EXPIRATION_PERIOD, end)?,
        };
        decoder.finish_nested_tlvs(end)?;
        Ok(route)
    }
}

/// One entry of the `rib/list` dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RibEntry {
    pub name: Name,
    pub routes: Vec<Route>,
}

impl RibEntry {
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_RIB_ENTRY, |e| {
            for route in self.routes.iter().rev() {
                route.encode(e);
            }
            self.name.encode(e);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_RIB_ENTRY)?;
        let name = Name::decode(decoder)?;
        let mut routes = Vec::new();
        while decoder.offset() < end {
            routes.push(Route::decode(decoder)?);
        }
        decoder.finish_nested_tlvs(end)?;
        Ok(Self { name, routes })
    }
}

/// One next hop of a FIB entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextHopRecord {
    pub face_id: u64,
    pub cost: u64,
}

impl NextHopRecord {
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_NEXT_HOP_RECORD, |e| {
            e.prepend_non_negative_integer_tlv(tlv::TLV_COST, self.cost);
            e.prepend_non_negative_integer_tlv(tlv::TLV_FACE_ID, self.face_id);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_NEXT_HOP_RECORD)?;
        let record = Self {
            face_id: decoder.read_non_negative_integer_tlv(tlv::TLV_FACE_ID)?,
            cost: decoder.read_non_negative_integer_tlv(tlv::TLV_COST)?,
        };
        decoder.finish_nested_tlvs(end)?;
        Ok(record)
    }
}

/// One entry of the `fib/list` dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibEntry {
    pub prefix: Name,
    pub next_hops: Vec<NextHopRecord>,
}

impl FibEntry {
    /// Returns true if one of the next hops goes through `face_id`.
    pub fn has_next_hop(&self, face_id: u64) -> bool {
        self.next_hops.iter().any(|hop| hop.face_id == face_id)
    }

    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_FIB_ENTRY, |e| {
            for hop in self.next_hops.iter().rev() {
                hop.encode(e);
            }
            self.prefix.encode(e);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_FIB_ENTRY)?;
        let prefix = Name::decode(decoder)?;
        let mut next_hops = Vec::new();
        while decoder.offset() < end {
            next_hops.push(NextHopRecord::decode(decoder)?);
        }
        decoder.finish_nested_tlvs(end)?;
        Ok(Self { prefix, next_hops })
    }
}

/// Content of the `status` dataset.
///
/// The fields sit directly in the Data content without an outer element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForwarderStatus {
    pub nfd_version: String,
    pub start_timestamp: u64,
    pub current_timestamp: u64,
    pub n_name_tree_entries: u64,
    pub n_fib_entries: u64,
    pub n_pit_entries: u64,
    pub n_measurement_entries: u64,
    pub n_cs_entries: u64,
    pub n_in_interests: u64,
    pub n_in_datas: u64,
    pub n_in_nacks: u64,
    pub n_out_interests: u64,
    pub n_out_datas: u64,
    pub n_out_nacks: u64,
}

impl ForwarderStatus {
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_OUT_NACKS, self.n_out_nacks);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_OUT_DATAS, self.n_out_datas);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_OUT_INTERESTS, self.n_out_interests);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_IN_NACKS, self.n_in_nacks);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_IN_DATAS, self.n_in_datas);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_IN_INTERESTS, self.n_in_interests);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_CS_ENTRIES, self.n_cs_entries);
        encoder.prepend_non_negative_integer_tlv(
            tlv::TLV_NUM_MEASUREMENT_ENTRIES,
            self.n_measurement_entries,
        );
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_PIT_ENTRIES, self.n_pit_entries);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_NUM_FIB_ENTRIES, self.n_fib_entries);
        encoder.prepend_non_negative_integer_tlv(
            tlv::TLV_NUM_NAME_TREE_ENTRIES,
            self.n_name_tree_entries,
        );
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_CURRENT_TIMESTAMP, self.current_timestamp);
        encoder.prepend_non_negative_integer_tlv(tlv::TLV_START_TIMESTAMP, self.start_timestamp);
        encoder.prepend_blob_tlv(tlv::TLV_NFD_VERSION, self.nfd_version.as_bytes());
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        Ok(Self {
            nfd_version: decoder.read_string_tlv(tlv::TLV_NFD_VERSION)?,
            start_timestamp: decoder.read_non_negative_integer_tlv(tlv::TLV_START_TIMESTAMP)?,
            current_timestamp: decoder.read_non_negative_integer_tlv(tlv::TLV_CURRENT_TIMESTAMP)?,
            n_name_tree_entries: decoder
                .read_non_negative_integer_tlv(tlv::TLV_NUM_NAME_TREE_ENTRIES)?,
            n_fib_entries: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_FIB_ENTRIES)?,
            n_pit_entries: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_PIT_ENTRIES)?,
            n_measurement_entries: decoder
                .read_non_negative_integer_tlv(tlv::TLV_NUM_MEASUREMENT_ENTRIES)?,
            n_cs_entries: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_CS_ENTRIES)?,
            n_in_interests: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_IN_INTERESTS)?,
            n_in_datas: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_IN_DATAS)?,
            n_in_nacks: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_IN_NACKS)?,
            n_out_interests: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_OUT_INTERESTS)?,
            n_out_datas: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_OUT_DATAS)?,
            n_out_nacks: decoder.read_non_negative_integer_tlv(tlv::TLV_NUM_OUT_NACKS)?,
        })
    }

    pub fn wire_encode(&self) -> Bytes {
        let mut encoder = TlvEncoder::new();
        self.encode(&mut encoder);
        encoder.finish()
    }

    /// Decode the whole of `input`; bytes after the last counter are an error.
    pub fn wire_decode(input: &[u8]) -> Result<Self, Error> {
        let mut decoder = TlvDecoder::new(input);
        let status = Self::decode(&mut decoder)?;
        if !decoder.is_finished() {
            return Err(Error::Encoding(format!(
                "{} trailing byte(s) after forwarder status",
                input.len() - decoder.offset()
            )));
        }
        Ok(status)
    }
}
