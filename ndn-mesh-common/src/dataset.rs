//! Status dataset decoding.
//!
//! A status dataset is the concatenated content of all segments of a
//! `faces/list`, `fib/list`, `rib/list` or `status` reply: a plain sequence
//! of self-delimited TLV entries with no outer wrapper.

use log::trace;

use crate::control::ControlResponse;
use crate::error::Error;
use crate::status::{FaceStatus, FibEntry, ForwarderStatus, RibEntry};
use crate::tlv::{TlvDecoder, TLV_CONTROL_RESPONSE};

/// Decode every entry of a dataset with `decode_entry`.
///
/// Fails when an entry overruns the buffer or when `decode_entry` returns
/// without consuming anything.
pub fn decode_entries<T, F>(input: &[u8], mut decode_entry: F) -> Result<Vec<T>, Error>
where
    F: FnMut(&mut TlvDecoder<'_>) -> Result<T, Error>,
{
    let mut decoder = TlvDecoder::new(input);
    let mut entries = Vec::new();

    while !decoder.is_finished() {
        let start = decoder.offset();
        let entry = decode_entry(&mut decoder)?;
        if decoder.offset() <= start {
            return Err(Error::Encoding(format!(
                "Dataset entry at offset {} did not advance the decoder",
                start
            )));
        }
        if decoder.offset() > input.len() {
            return Err(Error::Encoding(format!(
                "Dataset entry at offset {} overruns the {} byte buffer",
                start,
                input.len()
            )));
        }
        entries.push(entry);
    }

    trace!("Decoded {} dataset entries from {} bytes", entries.len(), input.len());
    Ok(entries)
}

/// Fail with the embedded management error when a dataset reply is actually
/// a ControlResponse.
pub fn reject_control_response(content: &[u8]) -> Result<(), Error> {
    match content.first() {
        Some(&first) if u64::from(first) == TLV_CONTROL_RESPONSE => {
            let response = ControlResponse::wire_decode(content)?;
            Err(Error::Management {
                code: response.status_code,
                text: response.status_text,
            })
        }
        _ => Ok(()),
    }
}

pub fn decode_face_list(input: &[u8]) -> Result<Vec<FaceStatus>, Error> {
    decode_entries(input, FaceStatus::decode)
}

pub fn decode_fib(input: &[u8]) -> Result<Vec<FibEntry>, Error> {
    decode_entries(input, FibEntry::decode)
}

pub fn decode_rib(input: &[u8]) -> Result<Vec<RibEntry>, Error> {
    decode_entries(input, RibEntry::decode)
}

/// The general status dataset holds exactly one flat record.
pub fn decode_forwarder_status(input: &[u8]) -> Result<ForwarderStatus, Error> {
    ForwarderStatus::wire_decode(input)
}
