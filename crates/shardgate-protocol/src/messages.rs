use bytes::Bytes;

pub const COM_QUIT: u8 = 0x01;
pub const COM_INIT_DB: u8 = 0x02;
pub const COM_QUERY: u8 = 0x03;
pub const COM_PING: u8 = 0x0e;
pub const COM_STMT_PREPARE: u8 = 0x16;
pub const COM_STMT_EXECUTE: u8 = 0x17;
pub const COM_STMT_CLOSE: u8 = 0x19;
pub const COM_STMT_RESET: u8 = 0x1a;

pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
pub const CLIENT_FOUND_ROWS: u32 = 0x0000_0002;
pub const CLIENT_LONG_FLAG: u32 = 0x0000_0004;
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub const CLIENT_TRANSACTIONS: u32 = 0x0000_2000;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;

pub const SERVER_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
    | CLIENT_FOUND_ROWS
    | CLIENT_LONG_FLAG
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH;

pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

pub const UTF8MB4_GENERAL_CI: u8 = 45;

/// Column and parameter type codes of the binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0a,
    Time = 0x0b,
    DateTime = 0x0c,
    Year = 0x0d,
    VarChar = 0x0f,
    Bit = 0x10,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    TinyBlob = 0xf9,
    MediumBlob = 0xfa,
    LongBlob = 0xfb,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
    Geometry = 0xff,
}

impl ColumnType {
    pub fn from_code(code: u8) -> Option<Self> {
        use ColumnType::*;
        let ty = match code {
            0x00 => Decimal,
            0x01 => Tiny,
            0x02 => Short,
            0x03 => Long,
            0x04 => Float,
            0x05 => Double,
            0x06 => Null,
            0x07 => Timestamp,
            0x08 => LongLong,
            0x09 => Int24,
            0x0a => Date,
            0x0b => Time,
            0x0c => DateTime,
            0x0d => Year,
            0x0f => VarChar,
            0x10 => Bit,
            0xf5 => Json,
            0xf6 => NewDecimal,
            0xf7 => Enum,
            0xf8 => Set,
            0xf9 => TinyBlob,
            0xfa => MediumBlob,
            0xfb => LongBlob,
            0xfc => Blob,
            0xfd => VarString,
            0xfe => String,
            0xff => Geometry,
            _ => return None,
        };
        Some(ty)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A bound parameter's declared type as sent in `COM_STMT_EXECUTE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterType {
    pub column_type: ColumnType,
    pub unsigned: bool,
}

#[derive(Debug, Clone)]
pub enum CommandPacket {
    Quit,
    Ping,
    InitDb { schema: String },
    Query { sql: String },
    StmtPrepare { sql: String },
    /// `body` starts right after the iteration count; parameters are decoded
    /// once the statement's parameter count is known.
    StmtExecute {
        statement_id: i32,
        flags: u8,
        body: Bytes,
    },
    StmtClose { statement_id: i32 },
    StmtReset { statement_id: i32 },
    Unsupported { code: u8 },
}

#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
    pub column_length: u32,
}

impl ColumnDefinition {
    pub fn var_string(name: impl Into<String>) -> Self {
        Self {
            schema: String::new(),
            table: String::new(),
            name: name.into(),
            column_type: ColumnType::VarString,
            column_length: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerPacket {
    Handshake {
        connection_id: u32,
        server_version: String,
        scramble: [u8; 20],
    },
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
    },
    Err {
        code: u16,
        sql_state: String,
        message: String,
    },
    Eof,
    PrepareOk {
        statement_id: i32,
        num_columns: u16,
        num_params: u16,
    },
    ColumnCount(u64),
    ColumnDefinition(ColumnDefinition),
}

/// One framed packet: payload plus the sequence id written in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}
