use crate::context::ProxyContext;
use anyhow::Result;
use bytes::Bytes;
use metrics::counter;
use rand_core::{OsRng, RngCore};
use shardgate_core::error::ProxyError;
use shardgate_core::registry::StatementId;
use shardgate_protocol::backend::{write_packet, write_packets};
use shardgate_protocol::binary_row::encode_binary_row;
use shardgate_protocol::execute::decode_execute_parameters;
use shardgate_protocol::frontend::{read_packet, HandshakeResponse};
use shardgate_protocol::messages::{
    ColumnDefinition, CommandPacket, Packet, ParameterType, ServerPacket,
};
use shardgate_route::Shard;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Collects the packets of one response, numbering them from 1 because the
/// command itself carried sequence id 0.
struct Response {
    sequence_id: u8,
    packets: Vec<Packet>,
}

impl Response {
    fn new() -> Self {
        Self {
            sequence_id: 1,
            packets: Vec::new(),
        }
    }

    fn next_sequence_id(&mut self) -> u8 {
        let id = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        id
    }

    fn push(&mut self, packet: ServerPacket) {
        let sequence_id = self.next_sequence_id();
        self.packets.push(packet.into_packet(sequence_id));
    }

    fn push_definitions(&mut self, columns: &[ColumnDefinition]) {
        if columns.is_empty() {
            return;
        }
        for column in columns {
            self.push(ServerPacket::ColumnDefinition(column.clone()));
        }
        self.push(ServerPacket::Eof);
    }

    fn error(err: &ProxyError) -> Vec<Packet> {
        let mut response = Response::new();
        response.push(ServerPacket::Err {
            code: err.error_code(),
            sql_state: err.sql_state().to_string(),
            message: err.to_string(),
        });
        response.packets
    }
}

pub struct Session {
    connection_id: u32,
    context: Arc<ProxyContext>,
    schema: Option<String>,
    /// Types bound by the last execution of each statement on this
    /// connection, reused when the client omits them.
    parameter_types: HashMap<StatementId, Vec<ParameterType>>,
}

impl Session {
    pub fn new(context: Arc<ProxyContext>) -> Self {
        Self {
            connection_id: context.next_connection_id(),
            context,
            schema: None,
            parameter_types: HashMap::new(),
        }
    }

    pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(mut self, stream: &mut S) -> Result<()> {
        if !self.handshake(stream).await? {
            return Ok(());
        }
        loop {
            let Some(packet) = read_packet(stream).await? else {
                debug!(connection_id = self.connection_id, "client closed connection");
                break;
            };
            let command = match CommandPacket::parse(packet.payload) {
                Ok(command) => command,
                Err(err) => {
                    write_packets(stream, &Response::error(&err)).await?;
                    continue;
                }
            };
            if matches!(command, CommandPacket::Quit) {
                break;
            }
            let packets = self.dispatch(command).await;
            if !packets.is_empty() {
                write_packets(stream, &packets).await?;
            }
        }
        Ok(())
    }

    async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(&mut self, stream: &mut S) -> Result<bool> {
        let mut scramble = [0u8; 20];
        OsRng.fill_bytes(&mut scramble);
        for byte in scramble.iter_mut() {
            *byte = *byte % 94 + 33;
        }
        let greeting = ServerPacket::Handshake {
            connection_id: self.connection_id,
            server_version: self.context.server_version.clone(),
            scramble,
        };
        write_packet(stream, &greeting.into_packet(0)).await?;
        let Some(reply) = read_packet(stream).await? else {
            return Ok(false);
        };
        let response = match HandshakeResponse::parse(reply.payload) {
            Ok(response) => response,
            Err(err) => {
                warn!(connection_id = self.connection_id, "malformed handshake response: {err}");
                let packet = ServerPacket::Err {
                    code: 1043,
                    sql_state: "08S01".into(),
                    message: "bad handshake".into(),
                }
                .into_packet(reply.sequence_id.wrapping_add(1));
                write_packet(stream, &packet).await?;
                return Ok(false);
            }
        };
        info!(
            connection_id = self.connection_id,
            user = %response.username,
            schema = response.database.as_deref().unwrap_or(""),
            "client connected"
        );
        self.schema = response.database;
        let ok = ServerPacket::Ok {
            affected_rows: 0,
            last_insert_id: 0,
        }
        .into_packet(reply.sequence_id.wrapping_add(1));
        write_packet(stream, &ok).await?;
        Ok(true)
    }

    async fn dispatch(&mut self, command: CommandPacket) -> Vec<Packet> {
        let result = match command {
            CommandPacket::StmtPrepare { sql } => self.prepare(&sql),
            CommandPacket::StmtExecute {
                statement_id, body, ..
            } => self.execute(statement_id, body).await,
            CommandPacket::StmtClose { statement_id } => {
                self.parameter_types.remove(&statement_id);
                return Vec::new();
            }
            CommandPacket::StmtReset { statement_id } => {
                self.parameter_types.remove(&statement_id);
                Ok(ok_response())
            }
            CommandPacket::Ping => Ok(ok_response()),
            CommandPacket::InitDb { schema } => {
                self.schema = Some(schema);
                Ok(ok_response())
            }
            CommandPacket::Query { .. } => Err(ProxyError::NotSupported(
                "text protocol queries; use prepared statements".into(),
            )),
            CommandPacket::Unsupported { code } => Err(ProxyError::NotSupported(format!(
                "command 0x{code:02x}"
            ))),
            CommandPacket::Quit => return Vec::new(),
        };
        match result {
            Ok(packets) => packets,
            Err(err) => {
                debug!(connection_id = self.connection_id, "command failed: {err}");
                Response::error(&err)
            }
        }
    }

    fn prepare(&mut self, sql: &str) -> Result<Vec<Packet>, ProxyError> {
        counter!("stmt_prepare_total").increment(1);
        let (statement_id, statement) = self.context.prepare(sql)?;
        debug!(
            connection_id = self.connection_id,
            statement_id,
            schema = self.schema.as_deref().unwrap_or(""),
            "prepared statement"
        );
        let num_columns = self.context.registry.num_columns(statement_id)?;
        let mut response = Response::new();
        response.push(ServerPacket::PrepareOk {
            statement_id,
            num_columns: wire_count(num_columns, "result columns")?,
            num_params: wire_count(statement.parameter_count, "parameters")?,
        });
        let params: Vec<ColumnDefinition> = (0..statement.parameter_count)
            .map(|_| ColumnDefinition::var_string("?"))
            .collect();
        response.push_definitions(&params);
        response.push_definitions(&statement.columns);
        Ok(response.packets)
    }

    async fn execute(&mut self, statement_id: StatementId, body: Bytes) -> Result<Vec<Packet>, ProxyError> {
        counter!("stmt_execute_total").increment(1);
        let result = self.execute_inner(statement_id, body).await;
        if result.is_err() {
            counter!("stmt_execute_error_total").increment(1);
        }
        result
    }

    async fn execute_inner(&mut self, statement_id: StatementId, body: Bytes) -> Result<Vec<Packet>, ProxyError> {
        let statement = self.context.statement(statement_id)?;
        let num_columns = self.context.registry.num_columns(statement_id)?;
        let previous = self.parameter_types.get(&statement_id).map(Vec::as_slice);
        let (parameters, types) =
            decode_execute_parameters(body, statement.parameter_count, previous)?;
        self.parameter_types.insert(statement_id, types);

        let route = statement.engine.shard(&parameters)?;
        let result = self
            .context
            .coordinator
            .execute(&route)
            .await
            .map_err(|err| ProxyError::Execution(err.to_string()))?;

        let mut response = Response::new();
        if num_columns == 0 {
            response.push(ServerPacket::Ok {
                affected_rows: result.rows_affected,
                last_insert_id: 0,
            });
            return Ok(response.packets);
        }
        response.push(ServerPacket::ColumnCount(num_columns as u64));
        response.push_definitions(&statement.columns);
        for row in &result.rows {
            let sequence_id = response.next_sequence_id();
            response
                .packets
                .push(encode_binary_row(sequence_id, num_columns, &row.values)?);
        }
        response.push(ServerPacket::Eof);
        Ok(response.packets)
    }
}

/// PREPARE_OK carries column and parameter counts as `int<2>`.
pub(crate) fn wire_count(count: usize, what: &str) -> Result<u16, ProxyError> {
    u16::try_from(count).map_err(|_| {
        ProxyError::NotSupported(format!("statement with {count} {what} (at most {})", u16::MAX))
    })
}

fn ok_response() -> Vec<Packet> {
    let mut response = Response::new();
    response.push(ServerPacket::Ok {
        affected_rows: 0,
        last_insert_id: 0,
    });
    response.packets
}
