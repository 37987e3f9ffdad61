use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("unknown statement: {0}")]
    UnknownStatement(String),
    #[error("unknown prepared statement handler ({0})")]
    UnknownStatementId(i32),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("row has {actual} values but {expected} columns were declared")]
    RowEncoding { expected: usize, actual: usize },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("sql error: {0}")]
    Sql(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl ProxyError {
    /// MySQL server error code reported in the ERR packet.
    pub fn error_code(&self) -> u16 {
        match self {
            ProxyError::UnknownStatement(_) | ProxyError::UnknownStatementId(_) => 1243,
            ProxyError::Routing(_) => 1105,
            ProxyError::RowEncoding { .. } | ProxyError::Execution(_) => 1105,
            ProxyError::Protocol(_) => 1835,
            ProxyError::Sql(_) => 1064,
            ProxyError::NotSupported(_) => 1047,
        }
    }

    pub fn sql_state(&self) -> &'static str {
        match self {
            ProxyError::UnknownStatement(_) | ProxyError::UnknownStatementId(_) => "HY000",
            ProxyError::Sql(_) => "42000",
            ProxyError::NotSupported(_) => "08S01",
            _ => "HY000",
        }
    }
}

/// Failures raised by a router. Deterministic for a fixed statement, rule and
/// parameter set, so callers never retry them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no data node matches the sharding value")]
    NoMatchingShard,
    #[error("sharding column `{0}` has no value in the statement")]
    MissingShardingValue(String),
    #[error("sharding value for `{0}` must not be null")]
    NullShardingValue(String),
    #[error("parameter index {index} out of range for {count} parameters")]
    ParameterOutOfRange { index: usize, count: usize },
    #[error("unsupported statement: {0}")]
    Unsupported(String),
    #[error("parse error: {0}")]
    Parse(String),
}
