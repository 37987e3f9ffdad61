use serde::Deserialize;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    MySql,
    PostgreSql,
}

impl DatabaseType {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            DatabaseType::MySql => Box::new(MySqlDialect {}),
            DatabaseType::PostgreSql => Box::new(PostgreSqlDialect {}),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShardingProperties {
    /// Log every produced route unit on the `sql_show` target.
    #[serde(default)]
    pub sql_show: bool,
}

/// A physical location of one shard of a logic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

/// Splits `logic_table` into `actual_table_count` tables named
/// `<logic_table>_<n>`, spread round-robin over the rule's data sources.
#[derive(Debug, Clone, Deserialize)]
pub struct TableRule {
    pub logic_table: String,
    pub sharding_column: String,
    pub actual_table_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardingRule {
    pub data_sources: Vec<String>,
    /// Receives statements that touch no sharded table. Defaults to the
    /// first data source.
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableRule>,
}

impl ShardingRule {
    pub fn table_rule(&self, name: &str) -> Option<&TableRule> {
        self.tables
            .iter()
            .find(|rule| rule.logic_table.eq_ignore_ascii_case(name))
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source
            .as_deref()
            .or_else(|| self.data_sources.first().map(String::as_str))
    }

    pub fn data_node(&self, table: &TableRule, shard_index: usize) -> Option<DataNode> {
        if self.data_sources.is_empty() || shard_index >= table.actual_table_count {
            return None;
        }
        Some(DataNode {
            data_source: self.data_sources[shard_index % self.data_sources.len()].clone(),
            table: format!("{}_{}", table.logic_table, shard_index),
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data_sources.is_empty() {
            return Err("sharding rule has no data sources".into());
        }
        if let Some(default) = &self.default_data_source {
            if !self.data_sources.contains(default) {
                return Err(format!("default data source {default} is not declared"));
            }
        }
        for table in &self.tables {
            if table.actual_table_count == 0 {
                return Err(format!("table {} has no actual tables", table.logic_table));
            }
            if table.sharding_column.is_empty() {
                return Err(format!("table {} has no sharding column", table.logic_table));
            }
        }
        Ok(())
    }
}
