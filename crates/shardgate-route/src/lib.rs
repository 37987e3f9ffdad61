pub mod cache;
pub mod engine;
pub mod parser;
pub mod router;
pub mod rule;

pub use cache::ParseCache;
pub use engine::{
    BinaryParameters, ParameterCloner, PreparedQueryEngine, Shard, ShardingEngine, TextParameters,
    TextQueryEngine,
};
pub use parser::{parse_statement, ParsedStatement, StatementKind};
pub use router::{Router, StandardRouter};
pub use rule::{DatabaseType, ShardingProperties, ShardingRule, TableRule};
