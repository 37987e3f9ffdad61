pub mod error;
pub mod registry;
pub mod types;

pub use error::{ProxyError, RoutingError};
pub use registry::{StatementId, StatementRegistry};
pub use types::{DataRow, DataValue, ParameterSet, RouteResult, RouteUnit};
