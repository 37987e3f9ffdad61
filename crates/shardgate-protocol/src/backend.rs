use crate::messages::{
    ColumnDefinition, Packet, ServerPacket, SERVER_CAPABILITIES, SERVER_STATUS_AUTOCOMMIT,
    UTF8MB4_GENERAL_CI,
};
use crate::payload::PacketPayload;
use anyhow::{anyhow, Result};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const MAX_PAYLOAD_LEN: usize = 0x00ff_ffff;

const AUTH_PLUGIN_NAME: &str = "mysql_native_password";

/// Frames `packet` as `len<3> seq<1> payload`. Payloads that need to be split
/// across several physical packets are rejected.
pub async fn write_packet<S: AsyncWrite + Unpin>(stream: &mut S, packet: &Packet) -> Result<()> {
    stream.write_all(&frame(packet)?).await?;
    stream.flush().await?;
    Ok(())
}

/// Writes a batch of packets and flushes once at the end.
pub async fn write_packets<S: AsyncWrite + Unpin>(stream: &mut S, packets: &[Packet]) -> Result<()> {
    let mut buf = BytesMut::new();
    for packet in packets {
        buf.extend_from_slice(&frame(packet)?);
    }
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

fn frame(packet: &Packet) -> Result<BytesMut> {
    let len = packet.payload.len();
    if len >= MAX_PAYLOAD_LEN {
        return Err(anyhow!("payload of {len} bytes exceeds a single packet"));
    }
    let mut buf = BytesMut::with_capacity(len + 4);
    buf.put_uint_le(len as u64, 3);
    buf.put_u8(packet.sequence_id);
    buf.extend_from_slice(&packet.payload);
    Ok(buf)
}

impl ServerPacket {
    pub fn write(&self, payload: &mut PacketPayload) {
        match self {
            ServerPacket::Handshake {
                connection_id,
                server_version,
                scramble,
            } => {
                payload.write_int1(10);
                payload.write_string_nul(server_version);
                payload.write_int4(*connection_id);
                payload.write_bytes(&scramble[..8]);
                payload.write_int1(0);
                payload.write_int2((SERVER_CAPABILITIES & 0xffff) as u16);
                payload.write_int1(UTF8MB4_GENERAL_CI);
                payload.write_int2(SERVER_STATUS_AUTOCOMMIT);
                payload.write_int2((SERVER_CAPABILITIES >> 16) as u16);
                payload.write_int1((scramble.len() + 1) as u8);
                payload.write_zero(10);
                payload.write_bytes(&scramble[8..]);
                payload.write_int1(0);
                payload.write_string_nul(AUTH_PLUGIN_NAME);
            }
            ServerPacket::Ok {
                affected_rows,
                last_insert_id,
            } => {
                payload.write_int1(0x00);
                payload.write_int_lenenc(*affected_rows);
                payload.write_int_lenenc(*last_insert_id);
                payload.write_int2(SERVER_STATUS_AUTOCOMMIT);
                payload.write_int2(0);
            }
            ServerPacket::Err {
                code,
                sql_state,
                message,
            } => {
                payload.write_int1(0xff);
                payload.write_int2(*code);
                payload.write_int1(b'#');
                let mut state = [b'H', b'Y', b'0', b'0', b'0'];
                for (slot, byte) in state.iter_mut().zip(sql_state.bytes()) {
                    *slot = byte;
                }
                payload.write_bytes(&state);
                payload.write_string_eof(message);
            }
            ServerPacket::Eof => {
                payload.write_int1(0xfe);
                payload.write_int2(0);
                payload.write_int2(SERVER_STATUS_AUTOCOMMIT);
            }
            ServerPacket::PrepareOk {
                statement_id,
                num_columns,
                num_params,
            } => {
                payload.write_int1(0x00);
                payload.write_int4(*statement_id as u32);
                payload.write_int2(*num_columns);
                payload.write_int2(*num_params);
                payload.write_int1(0);
                payload.write_int2(0);
            }
            ServerPacket::ColumnCount(count) => payload.write_int_lenenc(*count),
            ServerPacket::ColumnDefinition(column) => write_column_definition(payload, column),
        }
    }

    pub fn into_packet(self, sequence_id: u8) -> Packet {
        let mut payload = PacketPayload::new();
        self.write(&mut payload);
        Packet {
            sequence_id,
            payload: payload.freeze(),
        }
    }
}

fn write_column_definition(payload: &mut PacketPayload, column: &ColumnDefinition) {
    payload.write_string_lenenc("def");
    payload.write_string_lenenc(&column.schema);
    payload.write_string_lenenc(&column.table);
    payload.write_string_lenenc(&column.table);
    payload.write_string_lenenc(&column.name);
    payload.write_string_lenenc(&column.name);
    payload.write_int_lenenc(0x0c);
    payload.write_int2(u16::from(UTF8MB4_GENERAL_CI));
    payload.write_int4(column.column_length);
    payload.write_int1(column.column_type.code());
    payload.write_int2(0);
    payload.write_int1(0);
    payload.write_zero(2);
}
