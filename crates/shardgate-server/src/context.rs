use crate::config::Config;
use crate::coordinator::{Coordinator, ShardBackend};
use dashmap::DashMap;
use shardgate_core::error::{ProxyError, RoutingError};
use shardgate_core::registry::{StatementId, StatementRegistry};
use shardgate_protocol::messages::ColumnDefinition;
use shardgate_route::{ParseCache, PreparedQueryEngine, ShardingProperties, ShardingRule};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Everything bound to a statement id at prepare time.
pub struct PreparedStatement {
    pub engine: PreparedQueryEngine,
    pub parameter_count: usize,
    pub columns: Vec<ColumnDefinition>,
}

/// State shared by every connection handler.
pub struct ProxyContext {
    pub registry: Arc<StatementRegistry>,
    pub cache: ParseCache,
    pub rule: Arc<ShardingRule>,
    pub properties: ShardingProperties,
    pub coordinator: Coordinator,
    pub server_version: String,
    statements: DashMap<StatementId, Arc<PreparedStatement>>,
    connection_ids: AtomicU32,
}

impl ProxyContext {
    pub fn new(config: &Config, registry: Arc<StatementRegistry>, backend: Arc<dyn ShardBackend>) -> Self {
        let rule = Arc::new(config.sharding.rule.clone());
        let coordinator = Coordinator::start(&rule.data_sources, backend);
        Self {
            registry,
            cache: ParseCache::new(
                config.sharding.database_type,
                config.sharding.parse_cache_capacity,
            ),
            rule,
            properties: config.props.clone(),
            coordinator,
            server_version: config.server.server_version.clone(),
            statements: DashMap::new(),
            connection_ids: AtomicU32::new(1),
        }
    }

    pub fn next_connection_id(&self) -> u32 {
        self.connection_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `sql` and returns its id with the prepared state, building
    /// the routing engine only the first time the id is seen.
    pub fn prepare(&self, sql: &str) -> Result<(StatementId, Arc<PreparedStatement>), ProxyError> {
        let parsed = self.cache.get_or_parse(sql).map_err(sql_error)?;
        let columns = self.coordinator.columns(&parsed);
        let statement_id = self.registry.register(sql, columns.len());
        let statement = self.bind(statement_id, sql)?;
        Ok((statement_id, statement))
    }

    /// Resolves an id from `COM_STMT_EXECUTE` back to its prepared state.
    pub fn statement(&self, statement_id: StatementId) -> Result<Arc<PreparedStatement>, ProxyError> {
        if let Some(statement) = self.statements.get(&statement_id) {
            return Ok(Arc::clone(statement.value()));
        }
        let sql = self.registry.sql(statement_id)?;
        self.bind(statement_id, &sql)
    }

    fn bind(&self, statement_id: StatementId, sql: &str) -> Result<Arc<PreparedStatement>, ProxyError> {
        let entry = self.statements.entry(statement_id).or_try_insert_with(|| {
            let parsed = self.cache.get_or_parse(sql).map_err(sql_error)?;
            let engine = PreparedQueryEngine::prepare(
                sql,
                self.rule.clone(),
                self.properties.clone(),
                &self.cache,
            )?;
            debug!(statement_id, sql, "built routing engine");
            Ok::<_, ProxyError>(Arc::new(PreparedStatement {
                engine,
                parameter_count: parsed.parameter_count,
                columns: self.coordinator.columns(&parsed),
            }))
        })?;
        Ok(Arc::clone(entry.value()))
    }
}

fn sql_error(err: RoutingError) -> ProxyError {
    match err {
        RoutingError::Parse(message) => ProxyError::Sql(message),
        other => ProxyError::Routing(other),
    }
}
