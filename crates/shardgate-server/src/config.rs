use serde::Deserialize;
use shardgate_route::{DatabaseType, ShardingProperties, ShardingRule};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub sharding: ShardingConfig,
    #[serde(default)]
    pub props: ShardingProperties,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_connections: usize,
    #[serde(default = "default_server_version")]
    pub server_version: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShardingConfig {
    #[serde(default)]
    pub database_type: DatabaseType,
    #[serde(default = "default_parse_cache_capacity")]
    pub parse_cache_capacity: usize,
    #[serde(flatten)]
    pub rule: ShardingRule,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

fn default_server_version() -> String {
    "5.7.0-shardgate".to_string()
}

fn default_parse_cache_capacity() -> usize {
    1024
}

impl Config {
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be at least 1"));
        }
        if self.sharding.parse_cache_capacity == 0 {
            return Err(anyhow::anyhow!("parse_cache_capacity must be at least 1"));
        }
        self.sharding.rule.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
listen_addr = "127.0.0.1:3307"
max_connections = 16

[sharding]
database_type = "mysql"
data_sources = ["ds0", "ds1"]

[[sharding.tables]]
logic_table = "t_order"
sharding_column = "user_id"
actual_table_count = 4

[props]
sql_show = true

[metrics]
enabled = false
listen_addr = "127.0.0.1:9898"
"#;

    #[test]
    fn loads_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(SAMPLE.as_bytes()).expect("write");
        let path = file.path().to_string_lossy().to_string();
        let config = Config::from_path(&path).expect("config");
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.server_version, "5.7.0-shardgate");
        assert_eq!(config.sharding.parse_cache_capacity, 1024);
        assert_eq!(config.sharding.rule.data_sources.len(), 2);
        assert_eq!(config.sharding.rule.tables[0].actual_table_count, 4);
        assert_eq!(config.sharding.rule.default_data_source(), Some("ds0"));
        assert!(config.props.sql_show);
    }

    #[test]
    fn rejects_rule_without_data_sources() {
        let broken = SAMPLE.replace(r#"data_sources = ["ds0", "ds1"]"#, "data_sources = []");
        assert!(Config::from_toml(&broken).is_err());
    }

    #[test]
    fn rejects_zero_connections() {
        let broken = SAMPLE.replace("max_connections = 16", "max_connections = 0");
        assert!(Config::from_toml(&broken).is_err());
    }
}
