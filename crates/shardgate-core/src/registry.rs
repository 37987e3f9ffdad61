use crate::error::ProxyError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::debug;

pub type StatementId = i32;

/// Gives prepared SQL text a stable, process-unique statement id.
///
/// One instance is shared (through `Arc`) by every connection handler. Ids come
/// from a monotonically increasing counter and are never handed out twice, even
/// when a concurrent registration of the same SQL loses the race and its
/// claimed id is dropped.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    sql_to_id: DashMap<String, StatementId>,
    id_to_sql: DashMap<StatementId, String>,
    sql_to_num_columns: DashMap<String, usize>,
    sequence: AtomicI32,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `sql`, allocating one on first sight. A known `sql`
    /// keeps its original id and column count whatever `num_columns` says.
    pub fn register(&self, sql: &str, num_columns: usize) -> StatementId {
        if let Some(id) = self.sql_to_id.get(sql) {
            return *id;
        }
        let claimed = self.claim_id(sql);
        let (id, won) = match self.sql_to_id.entry(sql.to_string()) {
            Entry::Occupied(existing) => (*existing.get(), false),
            Entry::Vacant(slot) => {
                // column count must be readable before the id becomes visible
                self.sql_to_num_columns
                    .entry(sql.to_string())
                    .or_insert(num_columns);
                slot.insert(claimed);
                (claimed, true)
            }
        };
        if won {
            debug!(statement_id = id, num_columns, "registered prepared statement");
        } else {
            self.id_to_sql.remove(&claimed);
            debug!(
                statement_id = id,
                orphaned = claimed,
                "lost registration race, reusing committed id"
            );
        }
        id
    }

    fn claim_id(&self, sql: &str) -> StatementId {
        loop {
            let candidate = self.sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
            match self.id_to_sql.entry(candidate) {
                Entry::Vacant(slot) => {
                    slot.insert(sql.to_string());
                    return candidate;
                }
                Entry::Occupied(_) => continue,
            }
        }
    }

    pub fn statement_id(&self, sql: &str) -> Result<StatementId, ProxyError> {
        self.sql_to_id
            .get(sql)
            .map(|id| *id)
            .ok_or_else(|| ProxyError::UnknownStatement(sql.to_string()))
    }

    pub fn sql(&self, statement_id: StatementId) -> Result<String, ProxyError> {
        self.id_to_sql
            .get(&statement_id)
            .map(|sql| sql.clone())
            .ok_or(ProxyError::UnknownStatementId(statement_id))
    }

    pub fn num_columns(&self, statement_id: StatementId) -> Result<usize, ProxyError> {
        let sql = self.sql(statement_id)?;
        self.sql_to_num_columns
            .get(&sql)
            .map(|n| *n)
            .ok_or(ProxyError::UnknownStatementId(statement_id))
    }

    pub fn len(&self) -> usize {
        self.sql_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sql_to_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::StatementRegistry;
    use crate::error::ProxyError;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    #[test]
    fn register_round_trips() {
        let registry = StatementRegistry::new();
        let id = registry.register("SELECT id FROM t WHERE id = ?", 1);
        assert_eq!(registry.sql(id).expect("sql"), "SELECT id FROM t WHERE id = ?");
        assert_eq!(registry.num_columns(id).expect("columns"), 1);
        assert_eq!(
            registry.statement_id("SELECT id FROM t WHERE id = ?").expect("id"),
            id
        );
    }

    #[test]
    fn re_registration_keeps_first_id_and_column_count() {
        let registry = StatementRegistry::new();
        let first = registry.register("SELECT a, b FROM t", 2);
        let second = registry.register("SELECT a, b FROM t", 5);
        assert_eq!(first, second);
        assert_eq!(registry.num_columns(first).expect("columns"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_sql_gets_increasing_ids() {
        let registry = StatementRegistry::new();
        let a = registry.register("SELECT 1", 1);
        let b = registry.register("SELECT 2", 1);
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn unknown_lookups_fail() {
        let registry = StatementRegistry::new();
        assert!(matches!(
            registry.statement_id("SELECT 1"),
            Err(ProxyError::UnknownStatement(_))
        ));
        assert!(matches!(registry.sql(42), Err(ProxyError::UnknownStatementId(42))));
        assert!(matches!(
            registry.num_columns(42),
            Err(ProxyError::UnknownStatementId(42))
        ));
    }

    #[test]
    fn concurrent_registration_yields_single_id() {
        let registry = Arc::new(StatementRegistry::new());
        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|n| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    let id = registry.register("SELECT * FROM t WHERE id=?", n + 1);
                    (id, n + 1)
                })
            })
            .collect();
        let results: Vec<(i32, usize)> = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .collect();
        let ids: HashSet<i32> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), 1);
        let id = *ids.iter().next().expect("id");
        let columns = registry.num_columns(id).expect("columns");
        assert!((1..=callers).contains(&columns));
        assert_eq!(registry.sql(id).expect("sql"), "SELECT * FROM t WHERE id=?");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn orphaned_ids_are_never_reused() {
        let registry = Arc::new(StatementRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.register("SELECT 1", 1)
                })
            })
            .collect();
        let winner = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .max()
            .expect("id");
        let next = registry.register("SELECT 2", 1);
        assert!(next > winner);
    }
}
