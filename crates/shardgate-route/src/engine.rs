use crate::cache::ParseCache;
use crate::router::{Router, StandardRouter};
use crate::rule::{ShardingProperties, ShardingRule};
use shardgate_core::error::RoutingError;
use shardgate_core::types::{DataValue, ParameterSet, RouteResult};
use std::sync::Arc;
use tracing::info;

/// Produces a route result for one execution of a prepared statement.
pub trait Shard: Send + Sync {
    fn shard(&self, parameters: &[DataValue]) -> Result<RouteResult, RoutingError>;
}

/// Copies caller-owned parameters into a set the router may keep.
pub trait ParameterCloner: Send + Sync {
    fn clone_parameters(&self, parameters: &[DataValue]) -> ParameterSet;
}

/// Typed values bound through the binary protocol, copied as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryParameters;

impl ParameterCloner for BinaryParameters {
    fn clone_parameters(&self, parameters: &[DataValue]) -> ParameterSet {
        parameters.to_vec()
    }
}

/// Text protocol parameters: every non-null value is carried as its text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParameters;

impl ParameterCloner for TextParameters {
    fn clone_parameters(&self, parameters: &[DataValue]) -> ParameterSet {
        parameters
            .iter()
            .map(|value| match value {
                DataValue::Null => DataValue::Null,
                DataValue::String(text) => DataValue::String(text.clone()),
                DataValue::Bytes(raw) => DataValue::Bytes(raw.clone()),
                other => DataValue::String(other.to_string()),
            })
            .collect()
    }
}

/// Clone-then-route pipeline shared by every protocol variant.
pub struct ShardingEngine<C> {
    logic_sql: String,
    cloner: C,
    router: Arc<dyn Router>,
    properties: ShardingProperties,
}

pub type PreparedQueryEngine = ShardingEngine<BinaryParameters>;
pub type TextQueryEngine = ShardingEngine<TextParameters>;

impl<C: ParameterCloner> ShardingEngine<C> {
    pub fn with_router(
        logic_sql: impl Into<String>,
        cloner: C,
        router: Arc<dyn Router>,
        properties: ShardingProperties,
    ) -> Self {
        Self {
            logic_sql: logic_sql.into(),
            cloner,
            router,
            properties,
        }
    }

    pub fn logic_sql(&self) -> &str {
        &self.logic_sql
    }

    fn show(&self, result: &RouteResult) {
        for unit in &result.units {
            info!(
                target: "sql_show",
                logic_sql = %self.logic_sql,
                data_source = %unit.data_source,
                actual_sql = %unit.sql,
                parameters = ?unit.parameters,
                "route unit"
            );
        }
    }
}

impl<C: ParameterCloner + Default> ShardingEngine<C> {
    /// Binds the statement to its rule and builds the router once; the
    /// engine is then reused for every execution of `sql`.
    pub fn prepare(
        sql: &str,
        rule: Arc<ShardingRule>,
        properties: ShardingProperties,
        cache: &ParseCache,
    ) -> Result<Self, RoutingError> {
        let router = StandardRouter::new(sql, rule, cache)?;
        let logic_sql = router.logic_sql().to_string();
        Ok(Self::with_router(
            logic_sql,
            C::default(),
            Arc::new(router),
            properties,
        ))
    }
}

impl<C: ParameterCloner> Shard for ShardingEngine<C> {
    fn shard(&self, parameters: &[DataValue]) -> Result<RouteResult, RoutingError> {
        let cloned = self.cloner.clone_parameters(parameters);
        let result = self.router.route(cloned)?;
        if self.properties.sql_show {
            self.show(&result);
        }
        Ok(result)
    }
}
