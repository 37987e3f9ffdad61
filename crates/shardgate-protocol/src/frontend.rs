use crate::messages::{
    CommandPacket, Packet, CLIENT_CONNECT_WITH_DB, CLIENT_SECURE_CONNECTION, COM_INIT_DB, COM_PING, COM_QUERY, COM_QUIT, COM_STMT_CLOSE,
    COM_STMT_EXECUTE, COM_STMT_PREPARE, COM_STMT_RESET,
};
use crate::payload::PayloadReader;
use anyhow::Result;
use bytes::Bytes;
use shardgate_core::error::ProxyError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads one framed packet. Returns `Ok(None)` when the peer closed the
/// stream before a header arrived.
pub async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Packet>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(Packet {
        sequence_id: header[3],
        payload: Bytes::from(buf),
    }))
}

/// Client reply to the initial handshake. Credentials are accepted as-is.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capabilities: u32,
    pub username: String,
    pub database: Option<String>,
}

impl HandshakeResponse {
    pub fn parse(payload: Bytes) -> Result<Self, ProxyError> {
        let mut reader = PayloadReader::new(payload);
        let capabilities = reader.read_int4()?;
        let _max_packet_size = reader.read_int4()?;
        let _charset = reader.read_int1()?;
        reader.skip(23)?;
        let username = reader.read_string_nul()?;
        if capabilities & CLIENT_SECURE_CONNECTION != 0 {
            let auth_len = reader.read_int1()?;
            reader.skip(usize::from(auth_len))?;
        } else {
            reader.read_string_nul()?;
        }
        let database = if capabilities & CLIENT_CONNECT_WITH_DB != 0
            && reader.remaining() > 0
        {
            Some(reader.read_string_nul()?)
        } else {
            None
        };
        Ok(Self {
            capabilities,
            username,
            database,
        })
    }
}

impl CommandPacket {
    pub fn parse(payload: Bytes) -> Result<Self, ProxyError> {
        let mut reader = PayloadReader::new(payload);
        let code = reader.read_int1()?;
        let command = match code {
            COM_QUIT => CommandPacket::Quit,
            COM_PING => CommandPacket::Ping,
            COM_INIT_DB => CommandPacket::InitDb {
                schema: reader.read_string_eof(),
            },
            COM_QUERY => CommandPacket::Query {
                sql: reader.read_string_eof(),
            },
            COM_STMT_PREPARE => CommandPacket::StmtPrepare {
                sql: reader.read_string_eof(),
            },
            COM_STMT_EXECUTE => {
                let statement_id = reader.read_int4()? as i32;
                let flags = reader.read_int1()?;
                let _iteration_count = reader.read_int4()?;
                let body = reader.read_bytes(reader.remaining())?;
                CommandPacket::StmtExecute {
                    statement_id,
                    flags,
                    body,
                }
            }
            COM_STMT_CLOSE => CommandPacket::StmtClose {
                statement_id: reader.read_int4()? as i32,
            },
            COM_STMT_RESET => CommandPacket::StmtReset {
                statement_id: reader.read_int4()? as i32,
            },
            other => CommandPacket::Unsupported { code: other },
        };
        Ok(command)
    }
}
