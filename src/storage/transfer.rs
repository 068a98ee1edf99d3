//! Bulk transfer payload codec.
//!
//! The transport is line oriented, so a whole range travels as one line:
//! `key1:value1%0Akey2:value2%0A...FIN`.

use super::memory::RECORD_SEPARATOR;
use crate::error::{RingError, RingResult};

/// Terminates the record list of a transfer payload.
pub const END_OF_TRANSFER: &str = "FIN";

pub fn encode_entries(entries: &[(u32, String)]) -> String {
    let mut payload = String::new();
    for (key, value) in entries {
        payload.push_str(&key.to_string());
        payload.push(':');
        payload.push_str(value);
        payload.push_str(RECORD_SEPARATOR);
    }
    payload.push_str(END_OF_TRANSFER);
    payload
}

/// Decodes a payload line.
///
/// Blank segments are skipped, malformed records are logged and dropped, and
/// reading stops at `FIN`. A payload without `FIN` was cut short.
pub fn decode_entries(payload: &str) -> RingResult<Vec<(u32, String)>> {
    let mut entries = Vec::new();

    for segment in payload.trim_end_matches(['\r', '\n']).split(RECORD_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment == END_OF_TRANSFER {
            return Ok(entries);
        }

        let Some((key, value)) = segment.split_once(':') else {
            tracing::warn!("Invalid key-value pair in transfer: {}", segment);
            continue;
        };

        match key.trim().parse::<u32>() {
            Ok(key) => entries.push((key, value.trim().to_string())),
            Err(_) => tracing::warn!("Invalid key format in transfer record: {}", segment),
        }
    }

    Err(RingError::TransferIncomplete(format!(
        "Transfer payload ended without {} after {} entries",
        END_OF_TRANSFER,
        entries.len()
    )))
}
