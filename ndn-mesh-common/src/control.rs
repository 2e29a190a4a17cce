//! Management command payloads: ControlParameters and ControlResponse.

use crate::error::Error;
use crate::ndn::Name;
use crate::tlv::{self, TlvDecoder, TlvEncoder};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Status code of a successful command.
pub const STATUS_OK: u64 = 200;

/// Route inheritance and capture flags carried in the Flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ForwardingFlags {
    /// The route also applies to longer prefixes.
    pub child_inherit: bool,

    /// The route shadows routes on shorter prefixes.
    pub capture: bool,
}

impl ForwardingFlags {
    pub const CHILD_INHERIT: u64 = 1;
    pub const CAPTURE: u64 = 2;

    /// Builds flags from their integer form; unknown bits are an error.
    pub fn from_bits(bits: u64) -> Result<Self, Error> {
        let unknown = bits & !(Self::CHILD_INHERIT | Self::CAPTURE);
        if unknown != 0 {
            return Err(Error::Encoding(format!(
                "Unknown route flag bits {:#x} in {}",
                unknown, bits
            )));
        }
        Ok(Self {
            child_inherit: bits & Self::CHILD_INHERIT != 0,
            capture: bits & Self::CAPTURE != 0,
        })
    }

    /// Integer form of the flags.
    pub fn bits(&self) -> u64 {
        let mut bits = 0;
        if self.child_inherit {
            bits |= Self::CHILD_INHERIT;
        }
        if self.capture {
            bits |= Self::CAPTURE;
        }
        bits
    }
}

impl Default for ForwardingFlags {
    fn default() -> Self {
        Self {
            child_inherit: true,
            capture: false,
        }
    }
}

/// Per-face local control features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocalControlHeader {
    IncomingFaceId = 1,
    NextHopFaceId = 2,
    CachingPolicy = 3,
}

impl LocalControlHeader {
    pub fn number(self) -> u64 {
        self as u64
    }

    pub fn from_number(value: u64) -> Result<Self, Error> {
        match value {
            1 => Ok(Self::IncomingFaceId),
            2 => Ok(Self::NextHopFaceId),
            3 => Ok(Self::CachingPolicy),
            other => Err(Error::Encoding(format!(
                "Unknown local control feature {}",
                other
            ))),
        }
    }
}

/// Parameters of a management command.
///
/// Every field is optional and absent fields are left off the wire
/// entirely, so `cost: None` and `cost: Some(0)` encode differently.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_control_feature: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<ForwardingFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Name>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_period: Option<u64>,
}

impl ControlParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_face_id(mut self, face_id: u64) -> Self {
        self.face_id = Some(face_id);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_local_control_feature(mut self, feature: LocalControlHeader) -> Self {
        self.local_control_feature = Some(feature.number());
        self
    }

    pub fn with_origin(mut self, origin: u64) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_flags(mut self, flags: ForwardingFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_strategy(mut self, strategy: Name) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_expiration_period(mut self, expiration_period_ms: u64) -> Self {
        self.expiration_period = Some(expiration_period_ms);
        self
    }

    /// Prepends the parameters as a ControlParameters TLV.
    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_CONTROL_PARAMETERS, |e| {
            e.prepend_optional_non_negative_integer_tlv(
                tlv::TLV_EXPIRATION_PERIOD,
                self.expiration_period,
            );
            if let Some(strategy) = &self.strategy {
                e.prepend_nested(tlv::TLV_STRATEGY, |e| strategy.encode(e));
            }
            e.prepend_optional_non_negative_integer_tlv(
                tlv::TLV_FLAGS,
                self.flags.map(|flags| flags.bits()),
            );
            e.prepend_optional_non_negative_integer_tlv(tlv::TLV_COST, self.cost);
            e.prepend_optional_non_negative_integer_tlv(tlv::TLV_ORIGIN, self.origin);
            e.prepend_optional_non_negative_integer_tlv(
                tlv::TLV_LOCAL_CONTROL_FEATURE,
                self.local_control_feature,
            );
            e.prepend_optional_blob_tlv(tlv::TLV_URI, self.uri.as_deref().map(str::as_bytes));
            e.prepend_optional_non_negative_integer_tlv(tlv::TLV_FACE_ID, self.face_id);
            if let Some(name) = &self.name {
                name.encode(e);
            }
        });
    }

    /// Decodes a ControlParameters TLV.
    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_CONTROL_PARAMETERS)?;
        let mut parameters = Self::default();

        if decoder.peek_type(tlv::TLV_NAME, end) {
            parameters.name = Some(Name::decode(decoder)?);
        }
        parameters.face_id = decoder.read_optional_non_negative_integer_tlv(tlv::TLV_FACE_ID, end)?;
        parameters.uri = decoder
            .read_optional_blob_tlv(tlv::TLV_URI, end)?
            .map(|uri| {
                String::from_utf8(uri.to_vec())
                    .map_err(|e| Error::Encoding(format!("Uri is not valid UTF-8: {}", e)))
            })
            .transpose()?;
        parameters.local_control_feature =
            decoder.read_optional_non_negative_integer_tlv(tlv::TLV_LOCAL_CONTROL_FEATURE, end)?;
        parameters.origin = decoder.read_optional_non_negative_integer_tlv(tlv::TLV_ORIGIN, end)?;
        parameters.cost = decoder.read_optional_non_negative_integer_tlv(tlv::TLV_COST, end)?;
        parameters.flags = decoder
            .read_optional_non_negative_integer_tlv(tlv::TLV_FLAGS, end)?
            .map(ForwardingFlags::from_bits)
            .transpose()?;
        if decoder.peek_type(tlv::TLV_STRATEGY, end) {
            let strategy_end = decoder.read_nested_tlvs_start(tlv::TLV_STRATEGY)?;
            parameters.strategy = Some(Name::decode(decoder)?);
            decoder.finish_nested_tlvs(strategy_end)?;
        }
        parameters.expiration_period =
            decoder.read_optional_non_negative_integer_tlv(tlv::TLV_EXPIRATION_PERIOD, end)?;

        decoder.finish_nested_tlvs(end)?;
        Ok(parameters)
    }

    /// Encodes the parameters as a standalone TLV block.
    pub fn wire_encode(&self) -> Bytes {
        let mut encoder = TlvEncoder::new();
        self.encode(&mut encoder);
        encoder.finish()
    }

    /// Decodes parameters from a standalone TLV block.
    pub fn wire_decode(input: &[u8]) -> Result<Self, Error> {
        Self::decode(&mut TlvDecoder::new(input))
    }
}

/// The forwarder's answer to a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub status_code: u64,
    pub status_text: String,
    pub body: Vec<ControlParameters>,
}

impl ControlResponse {
    pub fn new(status_code: u64, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            body: Vec::new(),
        }
    }

    /// Appends one ControlParameters entry to the body.
    pub fn with_body(mut self, parameters: ControlParameters) -> Self {
        self.body.push(parameters);
        self
    }

    /// Returns true for status 200.
    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Turns a non-200 response into a management error.
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::Management {
                code: self.status_code,
                text: self.status_text,
            })
        }
    }

    pub fn encode(&self, encoder: &mut TlvEncoder) {
        encoder.prepend_nested(tlv::TLV_CONTROL_RESPONSE, |e| {
            for parameters in self.body.iter().rev() {
                parameters.encode(e);
            }
            e.prepend_blob_tlv(tlv::TLV_STATUS_TEXT, self.status_text.as_bytes());
            e.prepend_non_negative_integer_tlv(tlv::TLV_STATUS_CODE, self.status_code);
        });
    }

    pub fn decode(decoder: &mut TlvDecoder<'_>) -> Result<Self, Error> {
        let end = decoder.read_nested_tlvs_start(tlv::TLV_CONTROL_RESPONSE)?;
        let status_code = decoder.read_non_negative_integer_tlv(tlv::TLV_STATUS_CODE)?;
        let status_text = decoder.read_string_tlv(tlv::TLV_STATUS_TEXT)?;

        let mut body = Vec::new();
        while decoder.peek_type(tlv::TLV_CONTROL_PARAMETERS, end) {
            body.push(ControlParameters::decode(decoder)?);
        }

        decoder.finish_nested_tlvs(end)?;
        Ok(Self {
            status_code,
            status_text,
            body,
        })
    }

    pub fn wire_encode(&self) -> Bytes {
        let mut encoder = TlvEncoder::new();
        self.encode(&mut encoder);
        encoder.finish()
    }

    pub fn wire_decode(input: &[u8]) -> Result<Self, Error> {
        Self::decode(&mut TlvDecoder::new(input))
    }
}

impl fmt::Display for ControlResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code, self.status_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_parameters() -> ControlParameters {
        ControlParameters::new()
            .with_name(Name::from_uri("/ndn/edu").unwrap())
            .with_face_id(262)
            .with_uri("udp4://192.168.49.1:6363")
            .with_local_control_feature(LocalControlHeader::NextHopFaceId)
            .with_origin(255)
            .with_cost(10)
            .with_flags(ForwardingFlags {
                child_inherit: true,
                capture: true,
            })
            .with_strategy(Name::from_uri("/localhost/nfd/strategy/best-route").unwrap())
            .with_expiration_period(3_600_000)
    }

    #[test]
    fn test_parameters_round_trip() {
        let parameters = full_parameters();
        let wire = parameters.wire_encode();
        assert_eq!(wire[0] as u64, tlv::TLV_CONTROL_PARAMETERS);
        assert_eq!(ControlParameters::wire_decode(&wire).unwrap(), parameters);

        let empty = ControlParameters::new();
        assert_eq!(empty.wire_encode().as_ref(), &[104, 0]);
        assert_eq!(ControlParameters::wire_decode(&[104, 0]).unwrap(), empty);
    }

    #[test]
    fn test_absent_cost_is_not_encoded() {
        let parameters = ControlParameters::new()
            .with_name(Name::from_uri("/a").unwrap())
            .with_face_id(1);
        let wire = parameters.wire_encode();
        // 104 len [7 3 8 1 'a'] [105 1 1]
        assert_eq!(wire.as_ref(), &[104, 8, 7, 3, 8, 1, b'a', 105, 1, 1]);

        let decoded = ControlParameters::wire_decode(&wire).unwrap();
        assert_eq!(decoded.cost, None);

        let zero_cost = parameters.clone().with_cost(0);
        let decoded = ControlParameters::wire_decode(&zero_cost.wire_encode()).unwrap();
        assert_eq!(decoded.cost, Some(0));
    }

    #[test]
    fn test_parameters_wire_order() {
        let parameters = ControlParameters::new()
            .with_cost(5)
            .with_face_id(7)
            .with_origin(0);
        let wire = parameters.wire_encode();
        // FaceId, Origin, Cost regardless of how the struct was built
        assert_eq!(wire.as_ref(), &[104, 9, 105, 1, 7, 111, 1, 0, 106, 1, 5]);
    }

    #[test]
    fn test_truncated_parameters_never_decode() {
        let wire = full_parameters().wire_encode();
        for cut in 0..wire.len() {
            let result = ControlParameters::wire_decode(&wire[..cut]);
            assert!(
                matches!(result, Err(Error::Encoding(_))),
                "truncation at {} decoded to {:?}",
                cut,
                result
            );
        }
    }

    #[test]
    fn test_response_round_trip() {
        let response = ControlResponse::new(200, "OK")
            .with_body(ControlParameters::new().with_face_id(300).with_uri("udp4://10.0.0.2:6363"))
            .with_body(ControlParameters::new().with_cost(0));
        let decoded = ControlResponse::wire_decode(&response.wire_encode()).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.is_ok());
        assert_eq!(decoded.body.len(), 2);
    }

    #[test]
    fn test_truncated_response_never_decodes() {
        let wire = ControlResponse::new(200, "OK")
            .with_body(ControlParameters::new().with_face_id(300))
            .wire_encode();
        for cut in 0..wire.len() {
            let result = ControlResponse::wire_decode(&wire[..cut]);
            assert!(
                matches!(result, Err(Error::Encoding(_))),
                "truncation at {} decoded to {:?}",
                cut,
                result
            );
        }
    }

    #[test]
    fn test_error_response_keeps_text() {
        let response = ControlResponse::new(410, "Face not found");
        let decoded = ControlResponse::wire_decode(&response.wire_encode()).unwrap();
        match decoded.into_result() {
            Err(Error::Management { code, text }) => {
                assert_eq!(code, 410);
                assert_eq!(text, "Face not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_flags_bits() {
        let flags = ForwardingFlags::from_bits(3).unwrap();
        assert!(flags.child_inherit && flags.capture);
        assert!(matches!(ForwardingFlags::from_bits(4), Err(Error::Encoding(_))));
        assert_eq!(flags.bits(), 3);
        assert_eq!(ForwardingFlags::default().bits(), 1);
        assert_eq!(
            ForwardingFlags {
                child_inherit: false,
                capture: true
            }
            .bits(),
            2
        );
    }

    #[test]
    fn test_local_control_header_numbers() {
        assert_eq!(LocalControlHeader::IncomingFaceId.number(), 1);
        assert_eq!(
            LocalControlHeader::from_number(3).unwrap(),
            LocalControlHeader::CachingPolicy
        );
        assert!(LocalControlHeader::from_number(9).is_err());
    }
}
