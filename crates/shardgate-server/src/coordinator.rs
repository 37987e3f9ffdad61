use anyhow::{anyhow, Result};
use shardgate_core::types::{DataRow, DataValue, RouteResult, RouteUnit};
use shardgate_protocol::messages::ColumnDefinition;
use shardgate_route::ParsedStatement;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Debug, Clone, Default)]
pub struct ShardResult {
    pub rows: Vec<DataRow>,
    pub rows_affected: u64,
}

/// Runs route units against one physical data source.
pub trait ShardBackend: Send + Sync + 'static {
    /// Result columns a statement produces; fixed at prepare time.
    fn columns(&self, statement: &ParsedStatement) -> Vec<ColumnDefinition>;

    fn execute(&self, unit: &RouteUnit) -> Result<ShardResult>;
}

/// Answers every unit with the route itself instead of contacting a
/// database: one row of `(data_source, actual_sql, parameters)`.
#[derive(Debug, Default)]
pub struct PreviewBackend;

impl ShardBackend for PreviewBackend {
    fn columns(&self, _statement: &ParsedStatement) -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::var_string("data_source"),
            ColumnDefinition::var_string("actual_sql"),
            ColumnDefinition::var_string("parameters"),
        ]
    }

    fn execute(&self, unit: &RouteUnit) -> Result<ShardResult> {
        let parameters = unit
            .parameters
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(ShardResult {
            rows: vec![DataRow {
                values: vec![
                    DataValue::String(unit.data_source.clone()),
                    DataValue::String(unit.sql.clone()),
                    DataValue::String(parameters),
                ],
            }],
            rows_affected: 0,
        })
    }
}

struct ShardRequest {
    unit: RouteUnit,
    response: oneshot::Sender<Result<ShardResult>>,
}

/// One worker task per data source; units are sent over a channel and run
/// in route order.
#[derive(Clone)]
pub struct Coordinator {
    shards: Arc<HashMap<String, mpsc::Sender<ShardRequest>>>,
    backend: Arc<dyn ShardBackend>,
}

impl Coordinator {
    pub fn start(data_sources: &[String], backend: Arc<dyn ShardBackend>) -> Self {
        let mut shards = HashMap::new();
        for data_source in data_sources {
            let (tx, rx) = mpsc::channel(128);
            spawn_worker(data_source.clone(), backend.clone(), rx);
            shards.insert(data_source.clone(), tx);
        }
        Self {
            shards: Arc::new(shards),
            backend,
        }
    }

    pub fn columns(&self, statement: &ParsedStatement) -> Vec<ColumnDefinition> {
        self.backend.columns(statement)
    }

    pub async fn execute(&self, route: &RouteResult) -> Result<ShardResult> {
        let mut results = Vec::with_capacity(route.units.len());
        for unit in &route.units {
            let shard = self
                .shards
                .get(&unit.data_source)
                .ok_or_else(|| anyhow!("unknown data source {}", unit.data_source))?;
            let (tx, rx) = oneshot::channel();
            shard
                .send(ShardRequest {
                    unit: unit.clone(),
                    response: tx,
                })
                .await
                .map_err(|_| anyhow!("data source {} is unavailable", unit.data_source))?;
            results.push(rx.await??);
        }
        Ok(aggregate(results))
    }
}

fn spawn_worker(
    data_source: String,
    backend: Arc<dyn ShardBackend>,
    mut rx: mpsc::Receiver<ShardRequest>,
) {
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            debug!(data_source = %data_source, sql = %req.unit.sql, "executing route unit");
            let result = backend.execute(&req.unit);
            if let Err(err) = &result {
                error!(data_source = %data_source, "route unit failed: {err}");
            }
            let _ = req.response.send(result);
        }
    });
}

fn aggregate(results: Vec<ShardResult>) -> ShardResult {
    let mut combined = ShardResult::default();
    for mut result in results {
        combined.rows_affected += result.rows_affected;
        combined.rows.append(&mut result.rows);
    }
    combined
}
