use crate::parser::{normalize_sql, parse_statement, ParsedStatement};
use crate::rule::DatabaseType;
use lru::LruCache;
use shardgate_core::error::RoutingError;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::trace;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Bounded cache of parsed statements keyed by normalized SQL text. Parsing
/// happens outside the lock; two callers racing on the same miss both parse
/// and the later insert wins.
#[derive(Debug)]
pub struct ParseCache {
    database_type: DatabaseType,
    entries: Mutex<LruCache<String, Arc<ParsedStatement>>>,
}

impl ParseCache {
    pub fn new(database_type: DatabaseType, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            database_type,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn get_or_parse(&self, sql: &str) -> Result<Arc<ParsedStatement>, RoutingError> {
        let key = normalize_sql(sql);
        if let Some(parsed) = self.lock().get(key) {
            trace!(sql = key, "parse cache hit");
            return Ok(parsed.clone());
        }
        let parsed = Arc::new(parse_statement(key, self.database_type)?);
        self.lock().put(key.to_string(), parsed.clone());
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<ParsedStatement>>> {
        // entries are immutable once inserted, so a poisoned lock is still usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DatabaseType::default(), DEFAULT_CAPACITY)
    }
}
