//! Binary protocol result set row.
//!
//! Layout: `0x00`, a null bitmap of `(num_columns + 7 + 2) / 8` bytes whose
//! first two bits are reserved, then every non-null value in column order.
//! Values are written as length-encoded strings of their canonical text,
//! which is what clients expect for columns advertised as `VAR_STRING`.

use crate::messages::Packet;
use crate::payload::PacketPayload;
use shardgate_core::error::ProxyError;
use shardgate_core::types::DataValue;

const PACKET_HEADER: u8 = 0x00;
const NULL_BITMAP_OFFSET: usize = 2;

pub fn null_bitmap_len(num_columns: usize) -> usize {
    (num_columns + 7 + NULL_BITMAP_OFFSET) / 8
}

/// Builds the complete null bitmap for `values` before anything is written.
pub fn null_bitmap(values: &[DataValue]) -> Vec<u8> {
    let mut bitmap = vec![0u8; null_bitmap_len(values.len())];
    for (index, value) in values.iter().enumerate() {
        if value.is_null() {
            let position = index + NULL_BITMAP_OFFSET;
            bitmap[position / 8] |= 1 << (position % 8);
        }
    }
    bitmap
}

/// Writes one row body into `payload`. Nothing is written when the value
/// count does not match `num_columns`.
pub fn write_binary_row(
    payload: &mut PacketPayload,
    num_columns: usize,
    values: &[DataValue],
) -> Result<(), ProxyError> {
    if values.len() != num_columns {
        return Err(ProxyError::RowEncoding {
            expected: num_columns,
            actual: values.len(),
        });
    }
    let bitmap = null_bitmap(values);
    payload.write_int1(PACKET_HEADER);
    payload.write_bytes(&bitmap);
    for value in values {
        if let Some(text) = value.to_text_bytes() {
            payload.write_bytes_lenenc(&text);
        }
    }
    Ok(())
}

/// Encodes one result row as a framed packet.
pub fn encode_binary_row(
    sequence_id: u8,
    num_columns: usize,
    values: &[DataValue],
) -> Result<Packet, ProxyError> {
    let mut payload = PacketPayload::with_capacity(1 + null_bitmap_len(num_columns) + 8 * num_columns);
    write_binary_row(&mut payload, num_columns, values)?;
    Ok(Packet {
        sequence_id,
        payload: payload.freeze(),
    })
}
