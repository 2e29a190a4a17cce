//! TLV (Type‑Length‑Value) encoding and decoding utilities.
//!
//! NDN uses the same variable‑width number for the *type* and the *length*
//! of an element. Nested elements are built back to front: children are
//! prepended in reverse declaration order, then the parent header is
//! prepended once the size of its value is known. Decoding walks forward and
//! checks that every nested element ends exactly where its header said.

use crate::error::Error;
use bytes::Bytes;

/* ---------------------------------------------------------------- *
 * Packet‑level TLV types
 * ---------------------------------------------------------------- */

pub const TLV_NAME: u64 = 0x07;
pub const TLV_COMPONENT: u64 = 0x08;

/* ---------------------------------------------------------------- *
 * ControlParameters / ControlResponse
 * ---------------------------------------------------------------- */

pub const TLV_CONTROL_RESPONSE: u64 = 101;
pub const TLV_STATUS_CODE: u64 = 102;
pub const TLV_STATUS_TEXT: u64 = 103;

pub const TLV_CONTROL_PARAMETERS: u64 = 104;
pub const TLV_FACE_ID: u64 = 105;
pub const TLV_COST: u64 = 106;
pub const TLV_STRATEGY: u64 = 107;
pub const TLV_FLAGS: u64 = 108;
pub const TLV_EXPIRATION_PERIOD: u64 = 109;
pub const TLV_ORIGIN: u64 = 111;
pub const TLV_URI: u64 = 114;
pub const TLV_LOCAL_CONTROL_FEATURE: u64 = 116;

/* ---------------------------------------------------------------- *
 * Status datasets
 * ---------------------------------------------------------------- */

pub const TLV_FACE_STATUS: u64 = 128;
pub const TLV_LOCAL_URI: u64 = 129;
pub const TLV_FACE_SCOPE: u64 = 132;
pub const TLV_FACE_PERSISTENCY: u64 = 133;
pub const TLV_LINK_TYPE: u64 = 134;
pub const TLV_N_IN_INTERESTS: u64 = 144;
pub const TLV_N_IN_DATAS: u64 = 145;
pub const TLV_N_OUT_INTERESTS: u64 = 146;
pub const TLV_N_OUT_DATAS: u64 = 147;
pub const TLV_N_IN_BYTES: u64 = 148;
pub const TLV_N_OUT_BYTES: u64 = 149;
pub const TLV_N_IN_NACKS: u64 = 151;
pub const TLV_N_OUT_NACKS: u64 = 152;

pub const TLV_RIB_ENTRY: u64 = 128;
pub const TLV_ROUTE: u64 = 129;

pub const TLV_FIB_ENTRY: u64 = 128;
pub const TLV_NEXT_HOP_RECORD: u64 = 129;

pub const TLV_NFD_VERSION: u64 = 0x80;
pub const TLV_START_TIMESTAMP: u64 = 0x81;
pub const TLV_CURRENT_TIMESTAMP: u64 = 0x82;
pub const TLV_NUM_NAME_TREE_ENTRIES: u64 = 0x83;
pub const TLV_NUM_FIB_ENTRIES: u64 = 0x84;
pub const TLV_NUM_PIT_ENTRIES: u64 = 0x85;
pub const TLV_NUM_MEASUREMENT_ENTRIES: u64 = 0x86;
pub const TLV_NUM_CS_ENTRIES: u64 = 0x87;
pub const TLV_NUM_IN_INTERESTS: u64 = 0x90;
pub const TLV_NUM_IN_DATAS: u64 = 0x91;
pub const TLV_NUM_OUT_INTERESTS: u64 = 0x92;
pub const TLV_NUM_OUT_DATAS: u64 = 0x93;
pub const TLV_NUM_IN_NACKS: u64 = 0x97;
pub const TLV_NUM_OUT_NACKS: u64 = 0x98;

/* ---------------------------------------------------------------- *
 * Encoder
 * ---------------------------------------------------------------- */

/// Back‑to‑front TLV writer.
///
/// Every `prepend_*` call places its bytes *before* everything written so
/// far, so [`TlvEncoder::len`] doubles as a length checkpoint for nesting.
#[derive(Debug, Clone, Default)]
pub struct TlvEncoder {
    /// Output bytes, stored last byte first.
    buf: Vec<u8>,
}

impl TlvEncoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Prepend raw bytes.
    pub fn prepend_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    /// Prepend a variable‑width number.
    ///
    /// * `< 253`  → 1 byte
    /// * `≤ u16::MAX` → marker 253 + 2 bytes
    /// * `≤ u32::MAX` → marker 254 + 4 bytes
    /// * otherwise → marker 255 + 8 bytes
    pub fn prepend_var_number(&mut self, value: u64) {
        if value < 253 {
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.prepend_bytes(&(value as u16).to_be_bytes());
            self.buf.push(253);
        } else if value <= u32::MAX as u64 {
            self.prepend_bytes(&(value as u32).to_be_bytes());
            self.buf.push(254);
        } else {
            self.prepend_bytes(&value.to_be_bytes());
            self.buf.push(255);
        }
    }

    /// Prepend a (type, length) header.
    pub fn prepend_type_and_length(&mut self, tlv_type: u64, length: usize) {
        self.prepend_var_number(length as u64);
        self.prepend_var_number(tlv_type);
    }

    /// Prepend a NonNegativeInteger value (1, 2, 4 or 8 bytes, big endian).
    pub fn prepend_non_negative_integer(&mut self, value: u64) {
        if value <= u8::MAX as u64 {
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.prepend_bytes(&(value as u16).to_be_bytes());
        } else if value <= u32::MAX as u64 {
            self.prepend_bytes(&(value as u32).to_be_bytes());
        } else {
            self.prepend_bytes(&value.to_be_bytes());
        }
    }

    /// Prepend a full TLV whose value is a NonNegativeInteger.
    pub fn prepend_non_negative_integer_tlv(&mut self, tlv_type: u64, value: u64) {
        let checkpoint = self.len();
        self.prepend_non_negative_integer(value);
        let length = self.len() - checkpoint;
        self.prepend_type_and_length(tlv_type, length);
    }

    /// Like [`Self::prepend_non_negative_integer_tlv`]; writes nothing for `None`.
    pub fn prepend_optional_non_negative_integer_tlv(&mut self, tlv_type: u64, value: Option<u64>) {
        if let Some(value) = value {
            self.prepend_non_negative_integer_tlv(tlv_type, value);
        }
    }

    /// Prepend a full TLV with an opaque value.
    pub fn prepend_blob_tlv(&mut self, tlv_type: u64, value: &[u8]) {
        self.prepend_bytes(value);
        self.prepend_type_and_length(tlv_type, value.len());
    }

    /// Like [`Self::prepend_blob_tlv`]; writes nothing for `None`.
    pub fn prepend_optional_blob_tlv(&mut self, tlv_type: u64, value: Option<&[u8]>) {
        if let Some(value) = value {
            self.prepend_blob_tlv(tlv_type, value);
        }
    }

    /// Prepend a nested element.
    ///
    /// `encode_children` must prepend the children in reverse order; the
    /// header is written afterwards from the measured length.
    pub fn prepend_nested<F>(&mut self, tlv_type: u64, encode_children: F)
    where
        F: FnOnce(&mut Self),
    {
        let checkpoint = self.len();
        encode_children(self);
        let length = self.len() - checkpoint;
        self.prepend_type_and_length(tlv_type, length);
    }

    /// Consume the encoder and return the wire bytes in order.
    pub fn finish(self) -> Bytes {
        let mut buf = self.buf;
        buf.reverse();
        Bytes::from(buf)
    }
}

/* ---------------------------------------------------------------- *
 * Decoder
 * ---------------------------------------------------------------- */

/// Forward TLV reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct TlvDecoder<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> TlvDecoder<'a> {
    /// Create a decoder positioned at the start of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total length of the underlying buffer.
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Returns true once the whole buffer has been consumed.
    pub fn is_finished(&self) -> bool {
        self.offset >= self.input.len()
    }

    /// Move the read position; `offset` may be at most the buffer length.
    pub fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.input.len() {
            return Err(Error::Encoding(format!(
                "Cannot seek to offset {} in a {}-byte buffer",
                offset,
                self.input.len()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    /// Read a variable‑width number.
    pub fn read_var_number(&mut self) -> Result<u64, Error> {
        let first = *self.input.get(self.offset).ok_or_else(|| {
            Error::Encoding(format!(
                "Buffer underflow when decoding variable-width number at offset {}",
                self.offset
            ))
        })?;
        self.offset += 1;

        match first {
            0..=252 => Ok(first as u64),
            253 => self.read_big_endian(2),
            254 => self.read_big_endian(4),
            255 => self.read_big_endian(8),
        }
    }

    /// Read a (type, length) header and check the type.
    ///
    /// Fails if the announced length runs past the end of the buffer.
    pub fn read_type_and_length(&mut self, expected_type: u64) -> Result<usize, Error> {
        let start = self.offset;
        let tlv_type = self.read_var_number()?;
        if tlv_type != expected_type {
            return Err(Error::Encoding(format!(
                "Expected TLV type {} at offset {}, got {}",
                expected_type, start, tlv_type
            )));
        }

        let length = self.read_var_number()?;
        let remaining = self.input.len().saturating_sub(self.offset);
        match usize::try_from(length) {
            Ok(length) if length <= remaining => Ok(length),
            _ => Err(Error::Encoding(format!(
                "TLV type {} requires {} bytes but only {} available",
                tlv_type, length, remaining
            ))),
        }
    }

    /// Read the header of a nested element and return its end offset.
    pub fn read_nested_tlvs_start(&mut self, expected_type: u64) -> Result<usize, Error> {
        let length = self.read_type_and_length(expected_type)?;
        Ok(self.offset + length)
    }

    /// Check that the children of a nested element ended exactly at `end_offset`.
    pub fn finish_nested_tlvs(&self, end_offset: usize) -> Result<(), Error> {
        if self.offset != end_offset {
            return Err(Error::Encoding(format!(
                "TLV length mismatch: decoding stopped at offset {} but the element ends at {}",
                self.offset, end_offset
            )));
        }
        Ok(())
    }

    /// Returns true if the next element starts before `end_offset` and has
    /// type `expected_type`.
    pub fn peek_type(&self, expected_type: u64, end_offset: usize) -> bool {
        if self.offset >= end_offset {
            return false;
        }
        let mut probe = self.clone();
        matches!(probe.read_var_number(), Ok(tlv_type) if tlv_type == expected_type)
    }

    /// Read a TLV and return its value.
    pub fn read_blob_tlv(&mut self, expected_type: u64) -> Result<&'a [u8], Error> {
        let length = self.read_type_and_length(expected_type)?;
        self.take(length)
    }

    /// Read a TLV only if the next element matches `expected_type`.
    pub fn read_optional_blob_tlv(
        &mut self,
        expected_type: u64,
        end_offset: usize,
    ) -> Result<Option<&'a [u8]>, Error> {
        if self.peek_type(expected_type, end_offset) {
            self.read_blob_tlv(expected_type).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read a TLV whose value is UTF‑8 text.
    pub fn read_string_tlv(&mut self, expected_type: u64) -> Result<String, Error> {
        let value = self.read_blob_tlv(expected_type)?;
        String::from_utf8(value.to_vec()).map_err(|e| {
            Error::Encoding(format!("TLV type {} is not valid UTF-8: {}", expected_type, e))
        })
    }

    /// Read a TLV whose value is a NonNegativeInteger.
    pub fn read_non_negative_integer_tlv(&mut self, expected_type: u64) -> Result<u64, Error> {
        let value = self.read_blob_tlv(expected_type)?;
        decode_non_negative_integer(value)
    }

    /// Read a NonNegativeInteger TLV only if the next element matches.
    pub fn read_optional_non_negative_integer_tlv(
        &mut self,
        expected_type: u64,
        end_offset: usize,
    ) -> Result<Option<u64>, Error> {
        if self.peek_type(expected_type, end_offset) {
            self.read_non_negative_integer_tlv(expected_type).map(Some)
        } else {
            Ok(None)
        }
    }

    fn take(&mut self, length: usize) -> Result<&'a [u8], Error> {
        let end = self
            .offset
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                Error::Encoding(format!(
                    "Buffer underflow: need {} bytes at offset {} but only {} available",
                    length,
                    self.offset,
                    self.input.len().saturating_sub(self.offset)
                ))
            })?;
        let value = &self.input[self.offset..end];
        self.offset = end;
        Ok(value)
    }

    fn read_big_endian(&mut self, width: usize) -> Result<u64, Error> {
        let bytes = self.take(width)?;
        Ok(fold_big_endian(bytes))
    }
}

/* ---------------------------------------------------------------- *
 * Helpers
 * ---------------------------------------------------------------- */

/// Decode a NonNegativeInteger value, which must be 1, 2, 4 or 8 bytes long.
pub fn decode_non_negative_integer(bytes: &[u8]) -> Result<u64, Error> {
    match bytes.len() {
        1 | 2 | 4 | 8 => Ok(fold_big_endian(bytes)),
        n => Err(Error::Encoding(format!(
            "Invalid NonNegativeInteger length {}",
            n
        ))),
    }
}

fn fold_big_endian(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_number(value: u64) -> Vec<u8> {
        let mut encoder = TlvEncoder::new();
        encoder.prepend_var_number(value);
        encoder.finish().to_vec()
    }

    #[test]
    fn test_var_number_widths() {
        assert_eq!(var_number(0), vec![0]);
        assert_eq!(var_number(252), vec![252]);
        assert_eq!(var_number(253), vec![253, 0x00, 0xFD]);
        assert_eq!(var_number(65_535), vec![253, 0xFF, 0xFF]);
        assert_eq!(var_number(65_536), vec![254, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(var_number(1 << 32).len(), 9);
        assert_eq!(var_number(1 << 32)[0], 255);
    }

    #[test]
    fn test_var_number_decode() {
        for value in [0u64, 1, 252, 253, 1000, 65_535, 65_536, u32::MAX as u64, 1 << 40] {
            let wire = var_number(value);
            let mut decoder = TlvDecoder::new(&wire);
            assert_eq!(decoder.read_var_number().unwrap(), value);
            assert!(decoder.is_finished());
        }
    }

    #[test]
    fn test_non_negative_integer_widths() {
        let mut encoder = TlvEncoder::new();
        encoder.prepend_non_negative_integer_tlv(TLV_COST, 300);
        assert_eq!(encoder.finish().to_vec(), vec![106, 2, 0x01, 0x2C]);

        let mut encoder = TlvEncoder::new();
        encoder.prepend_non_negative_integer_tlv(TLV_COST, 70_000);
        assert_eq!(encoder.finish().to_vec(), vec![106, 4, 0x00, 0x01, 0x11, 0x70]);

        assert!(decode_non_negative_integer(&[1, 2, 3]).is_err());
        assert_eq!(decode_non_negative_integer(&[0, 0, 0, 0, 0, 0, 1, 0]).unwrap(), 256);
    }

    #[test]
    fn test_nested_is_written_back_to_front() {
        let mut encoder = TlvEncoder::new();
        encoder.prepend_nested(TLV_ROUTE, |e| {
            // children in reverse order: cost, then face id
            e.prepend_non_negative_integer_tlv(TLV_COST, 7);
            e.prepend_non_negative_integer_tlv(TLV_FACE_ID, 1);
        });
        assert_eq!(
            encoder.finish().to_vec(),
            vec![129, 6, 105, 1, 1, 106, 1, 7]
        );
    }

    #[test]
    fn test_nested_decode() {
        let wire = [129u8, 6, 105, 1, 1, 106, 1, 7];
        let mut decoder = TlvDecoder::new(&wire);
        let end = decoder.read_nested_tlvs_start(TLV_ROUTE).unwrap();
        assert_eq!(end, 8);
        assert_eq!(decoder.read_non_negative_integer_tlv(TLV_FACE_ID).unwrap(), 1);
        assert_eq!(
            decoder.read_optional_non_negative_integer_tlv(TLV_ORIGIN, end).unwrap(),
            None
        );
        assert_eq!(
            decoder.read_optional_non_negative_integer_tlv(TLV_COST, end).unwrap(),
            Some(7)
        );
        decoder.finish_nested_tlvs(end).unwrap();
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let wire = [105u8, 1, 1];
        let mut decoder = TlvDecoder::new(&wire);
        let err = decoder.read_non_negative_integer_tlv(TLV_COST).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_truncated_length_is_an_error() {
        let wire = [129u8, 6, 105, 1, 1];
        let mut decoder = TlvDecoder::new(&wire);
        assert!(decoder.read_nested_tlvs_start(TLV_ROUTE).is_err());
    }

    #[test]
    fn test_length_mismatch_is_detected() {
        // outer element claims 4 bytes, the child needs 3 and one byte is left over
        let wire = [129u8, 4, 105, 1, 1, 0];
        let mut decoder = TlvDecoder::new(&wire);
        let end = decoder.read_nested_tlvs_start(TLV_ROUTE).unwrap();
        decoder.read_non_negative_integer_tlv(TLV_FACE_ID).unwrap();
        assert!(decoder.finish_nested_tlvs(end).is_err());
    }

    #[test]
    fn test_seek_stays_inside_buffer() {
        let wire = [105u8, 1, 1];
        let mut decoder = TlvDecoder::new(&wire);
        assert!(decoder.seek(4).is_err());
        assert_eq!(decoder.offset(), 0);

        decoder.seek(3).unwrap();
        assert!(decoder.is_finished());
        assert!(decoder.read_type_and_length(TLV_FACE_ID).is_err());

        decoder.seek(0).unwrap();
        assert_eq!(decoder.read_non_negative_integer_tlv(TLV_FACE_ID).unwrap(), 1);
    }

    #[test]
    fn test_peek_type_respects_end_offset() {
        let wire = [105u8, 1, 1];
        let decoder = TlvDecoder::new(&wire);
        assert!(decoder.peek_type(TLV_FACE_ID, 3));
        assert!(!decoder.peek_type(TLV_FACE_ID, 0));
        assert!(!decoder.peek_type(TLV_COST, 3));
    }
}
