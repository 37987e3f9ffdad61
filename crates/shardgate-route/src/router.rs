use crate::cache::ParseCache;
use crate::parser::{ParsedStatement, StatementKind};
use crate::rule::{ShardingRule, TableRule};
use shardgate_core::error::RoutingError;
use shardgate_core::types::{DataValue, ParameterSet, RouteResult, RouteUnit};
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::Token;
use std::sync::Arc;

/// Turns a parameter set into an execution plan for one prepared statement.
///
/// Implementations are built once per statement and shared between
/// connections, so `route` must not mutate plan state.
pub trait Router: Send + Sync {
    fn route(&self, parameters: ParameterSet) -> Result<RouteResult, RoutingError>;
}

#[derive(Debug)]
struct ShardedTable {
    rule: TableRule,
    /// Token indexes naming the logic table.
    table_tokens: Vec<usize>,
    /// Placeholder ordinal bound to the sharding column, if the statement
    /// pins it to a single value.
    sharding_parameter: Option<usize>,
}

/// Table-rule router: one sharded logic table per statement, sharding
/// value taken from a `column = ?` predicate or the INSERT column list.
#[derive(Debug)]
pub struct StandardRouter {
    parsed: Arc<ParsedStatement>,
    rule: Arc<ShardingRule>,
    table: Option<ShardedTable>,
}

impl StandardRouter {
    pub fn new(sql: &str, rule: Arc<ShardingRule>, cache: &ParseCache) -> Result<Self, RoutingError> {
        let parsed = cache.get_or_parse(sql)?;
        let table = resolve_table(&parsed, &rule)?;
        Ok(Self {
            parsed,
            rule,
            table,
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.parsed.parameter_count
    }

    pub fn logic_sql(&self) -> &str {
        &self.parsed.sql
    }

    fn rewrite(&self, table: &ShardedTable, actual_table: &str) -> String {
        let sql = &self.parsed.sql;
        let mut rewritten = String::with_capacity(sql.len() + 8);
        let mut cursor = 0;
        for &index in &table.table_tokens {
            let start = self.parsed.offsets[index];
            let (len, quote) = match &self.parsed.tokens[index] {
                Token::Word(word) => match word.quote_style {
                    Some(q) => (word.value.len() + 2, Some(q)),
                    None => (word.value.len(), None),
                },
                other => (other.to_string().len(), None),
            };
            rewritten.push_str(&sql[cursor..start]);
            match quote {
                Some(q) => {
                    let close = if q == '[' { ']' } else { q };
                    rewritten.push(q);
                    rewritten.push_str(actual_table);
                    rewritten.push(close);
                }
                None => rewritten.push_str(actual_table),
            }
            cursor = (start + len).min(sql.len());
        }
        rewritten.push_str(&sql[cursor..]);
        rewritten
    }
}

impl Router for StandardRouter {
    fn route(&self, parameters: ParameterSet) -> Result<RouteResult, RoutingError> {
        if parameters.len() < self.parsed.parameter_count {
            return Err(RoutingError::ParameterOutOfRange {
                index: parameters.len(),
                count: self.parsed.parameter_count,
            });
        }
        let Some(table) = &self.table else {
            let data_source = self
                .rule
                .default_data_source()
                .ok_or(RoutingError::NoMatchingShard)?;
            return Ok(RouteResult::single(RouteUnit {
                data_source: data_source.to_string(),
                sql: self.parsed.sql.clone(),
                parameters,
            }));
        };

        let shard_indexes: Vec<usize> = match table.sharding_parameter {
            Some(index) => {
                let value = parameters
                    .get(index)
                    .ok_or(RoutingError::ParameterOutOfRange {
                        index,
                        count: parameters.len(),
                    })?;
                if value.is_null() {
                    return Err(RoutingError::NullShardingValue(
                        table.rule.sharding_column.clone(),
                    ));
                }
                vec![shard_index(value, table.rule.actual_table_count)?]
            }
            None if self.parsed.kind == StatementKind::Insert => {
                return Err(RoutingError::MissingShardingValue(
                    table.rule.sharding_column.clone(),
                ))
            }
            None => (0..table.rule.actual_table_count).collect(),
        };

        let mut units = Vec::with_capacity(shard_indexes.len());
        for shard in shard_indexes {
            let node = self
                .rule
                .data_node(&table.rule, shard)
                .ok_or(RoutingError::NoMatchingShard)?;
            units.push(RouteUnit {
                data_source: node.data_source,
                sql: self.rewrite(table, &node.table),
                parameters: parameters.clone(),
            });
        }
        Ok(RouteResult { units })
    }
}

fn resolve_table(
    parsed: &ParsedStatement,
    rule: &ShardingRule,
) -> Result<Option<ShardedTable>, RoutingError> {
    let mut found: Option<&TableRule> = None;
    let mut table_tokens = Vec::new();
    for (index, token) in parsed.tokens.iter().enumerate() {
        let Token::Word(word) = token else { continue };
        let Some(table_rule) = rule.table_rule(&word.value) else {
            continue;
        };
        if is_qualified_column(&parsed.tokens, index) {
            continue;
        }
        match found {
            Some(existing) if !existing.logic_table.eq_ignore_ascii_case(&table_rule.logic_table) => {
                return Err(RoutingError::Unsupported(format!(
                    "statement references sharded tables {} and {}",
                    existing.logic_table, table_rule.logic_table
                )));
            }
            _ => found = Some(table_rule),
        }
        table_tokens.push(index);
    }
    let Some(table_rule) = found else {
        return Ok(None);
    };
    let sharding_parameter = match parsed.kind {
        StatementKind::Insert => insert_sharding_parameter(parsed, &table_tokens, table_rule)?,
        _ => predicate_sharding_parameter(parsed, table_rule),
    };
    Ok(Some(ShardedTable {
        rule: table_rule.clone(),
        table_tokens,
        sharding_parameter,
    }))
}

// `t.col` where the logic table name is used as a qualifier stays a table
// token. A word after `.` is a column named like the table, unless the
// qualifier follows a keyword that introduces a table (`FROM shop.t_order`).
fn is_qualified_column(tokens: &[Token], index: usize) -> bool {
    let Some(period) = prev_significant(tokens, index) else {
        return false;
    };
    if !matches!(tokens[period], Token::Period) {
        return false;
    }
    let Some(qualifier) = prev_significant(tokens, period) else {
        return true;
    };
    if !matches!(tokens[qualifier], Token::Word(_)) {
        return true;
    }
    match prev_significant(tokens, qualifier) {
        Some(before) => !is_keyword(
            &tokens[before],
            &[Keyword::FROM, Keyword::JOIN, Keyword::INTO, Keyword::UPDATE, Keyword::TABLE],
        ),
        None => true,
    }
}

fn is_keyword(token: &Token, keywords: &[Keyword]) -> bool {
    matches!(token, Token::Word(word) if keywords.contains(&word.keyword))
}

/// First token of the operand ending at `index`, stepping back over a
/// `qualifier.` prefix.
fn operand_start(tokens: &[Token], index: usize) -> usize {
    match prev_significant(tokens, index) {
        Some(period) if matches!(tokens[period], Token::Period) => {
            prev_significant(tokens, period).unwrap_or(period)
        }
        _ => index,
    }
}

/// True when `start..=end` is a whole comparison bounded by WHERE/AND/`(`
/// on the left and AND/`)`/a clause keyword or the end on the right, so
/// neither side is part of a larger expression such as `? + 1`.
fn is_standalone_comparison(tokens: &[Token], start: usize, end: usize) -> bool {
    let opens = prev_significant(tokens, start).is_some_and(|i| {
        matches!(tokens[i], Token::LParen) || is_keyword(&tokens[i], &[Keyword::WHERE, Keyword::AND])
    });
    let closes = match next_significant(tokens, end + 1) {
        None => true,
        Some(i) => {
            matches!(tokens[i], Token::RParen | Token::SemiColon)
                || is_keyword(
                    &tokens[i],
                    &[
                        Keyword::AND,
                        Keyword::ORDER,
                        Keyword::GROUP,
                        Keyword::LIMIT,
                        Keyword::HAVING,
                        Keyword::FOR,
                    ],
                )
        }
    };
    opens && closes
}

fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !matches!(tokens[i], Token::Whitespace(_)))
}

fn prev_significant(tokens: &[Token], before: usize) -> Option<usize> {
    (0..before).rev().find(|&i| !matches!(tokens[i], Token::Whitespace(_)))
}

fn is_column(token: &Token, column: &str) -> bool {
    matches!(token, Token::Word(word) if word.value.eq_ignore_ascii_case(column))
}

/// Finds `column = ?` (or `? = column`) in the WHERE clause. A WHERE clause
/// containing OR is never pinned to a single shard.
fn predicate_sharding_parameter(parsed: &ParsedStatement, table: &TableRule) -> Option<usize> {
    let tokens = &parsed.tokens;
    let where_at = tokens
        .iter()
        .position(|t| matches!(t, Token::Word(w) if w.keyword == Keyword::WHERE))?;
    if tokens[where_at..]
        .iter()
        .any(|t| matches!(t, Token::Word(w) if w.keyword == Keyword::OR))
    {
        return None;
    }
    for index in where_at + 1..tokens.len() {
        if !matches!(tokens[index], Token::Eq) {
            continue;
        }
        let (Some(left), Some(right)) = (prev_significant(tokens, index), next_significant(tokens, index + 1))
        else {
            continue;
        };
        let placeholder = if is_column(&tokens[left], &table.sharding_column)
            && matches!(tokens[right], Token::Placeholder(_))
        {
            right
        } else if matches!(tokens[left], Token::Placeholder(_))
            && is_column(&tokens[right], &table.sharding_column)
        {
            left
        } else {
            continue;
        };
        if !is_standalone_comparison(tokens, operand_start(tokens, left), right) {
            continue;
        }
        return Some(parsed.placeholder_ordinal(placeholder));
    }
    None
}

/// Maps the sharding column's position in `INSERT INTO t (cols) VALUES (...)`
/// to the placeholder at the same position of the values tuple.
fn insert_sharding_parameter(
    parsed: &ParsedStatement,
    table_tokens: &[usize],
    table: &TableRule,
) -> Result<Option<usize>, RoutingError> {
    let tokens = &parsed.tokens;
    let Some(&table_at) = table_tokens.first() else {
        return Ok(None);
    };
    let Some(open) = next_significant(tokens, table_at + 1) else {
        return Ok(None);
    };
    if !matches!(tokens[open], Token::LParen) {
        return Ok(None);
    }
    let mut column_position = None;
    let mut position = 0;
    let mut cursor = open + 1;
    while cursor < tokens.len() {
        match &tokens[cursor] {
            Token::RParen => break,
            Token::Comma => position += 1,
            token if is_column(token, &table.sharding_column) => column_position = Some(position),
            _ => {}
        }
        cursor += 1;
    }
    let Some(column_position) = column_position else {
        return Ok(None);
    };
    let Some(values_at) = (cursor..tokens.len()).find(|&i| {
        matches!(&tokens[i], Token::Word(w) if w.keyword == Keyword::VALUES || w.keyword == Keyword::VALUE)
    }) else {
        return Ok(None);
    };
    let Some(tuple_open) = next_significant(tokens, values_at + 1) else {
        return Ok(None);
    };
    if !matches!(tokens[tuple_open], Token::LParen) {
        return Ok(None);
    }

    let mut depth = 0usize;
    let mut position = 0;
    let mut item_start = tuple_open + 1;
    let mut found = None;
    let mut tuple_close = None;
    for index in tuple_open..tokens.len() {
        match tokens[index] {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    if position == column_position {
                        found = single_placeholder(parsed, item_start, index);
                    }
                    tuple_close = Some(index);
                    break;
                }
            }
            Token::Comma if depth == 1 => {
                if position == column_position {
                    found = single_placeholder(parsed, item_start, index);
                }
                position += 1;
                item_start = index + 1;
            }
            _ => {}
        }
    }
    if let Some(close) = tuple_close {
        if let Some(after) = next_significant(tokens, close + 1) {
            if matches!(tokens[after], Token::Comma) {
                return Err(RoutingError::Unsupported(
                    "multi-row INSERT into a sharded table".into(),
                ));
            }
        }
    }
    Ok(found)
}

fn single_placeholder(parsed: &ParsedStatement, start: usize, end: usize) -> Option<usize> {
    let mut significant = (start..end).filter(|&i| !matches!(parsed.tokens[i], Token::Whitespace(_)));
    let first = significant.next()?;
    if significant.next().is_some() {
        return None;
    }
    match parsed.tokens[first] {
        Token::Placeholder(_) => Some(parsed.placeholder_ordinal(first)),
        _ => None,
    }
}

/// Integers shard by modulo; anything else by a string hash of its text.
fn shard_index(value: &DataValue, shard_count: usize) -> Result<usize, RoutingError> {
    if shard_count == 0 {
        return Err(RoutingError::NoMatchingShard);
    }
    let count = shard_count as u64;
    let index = match value {
        DataValue::Null => return Err(RoutingError::NoMatchingShard),
        DataValue::Int64(v) => v.rem_euclid(count as i64) as u64,
        DataValue::UInt64(v) => v % count,
        DataValue::Bool(v) => u64::from(*v) % count,
        DataValue::Float64(v) if v.fract() == 0.0 && v.is_finite() => {
            (*v as i64).rem_euclid(count as i64) as u64
        }
        DataValue::Float64(_) => return Err(RoutingError::NoMatchingShard),
        DataValue::String(s) => match s.trim().parse::<i64>() {
            Ok(v) => v.rem_euclid(count as i64) as u64,
            Err(_) => hash_value(s.as_bytes()) % count,
        },
        DataValue::Bytes(b) => hash_value(b) % count,
    };
    Ok(index as usize)
}

fn hash_value(bytes: &[u8]) -> u64 {
    let mut hash = 0u64;
    for b in bytes {
        hash = hash.wrapping_mul(31).wrapping_add(u64::from(*b));
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::shard_index;
    use shardgate_core::types::DataValue;

    #[test]
    fn integer_values_shard_by_modulo() {
        assert_eq!(shard_index(&DataValue::Int64(42), 4).expect("index"), 2);
        assert_eq!(shard_index(&DataValue::Int64(-1), 4).expect("index"), 3);
        assert_eq!(shard_index(&DataValue::UInt64(9), 4).expect("index"), 1);
        assert_eq!(shard_index(&DataValue::String("13".into()), 4).expect("index"), 1);
    }

    #[test]
    fn text_values_hash_stably() {
        let a = shard_index(&DataValue::String("alice".into()), 8).expect("index");
        let b = shard_index(&DataValue::String("alice".into()), 8).expect("index");
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn fractional_values_match_no_shard() {
        assert!(shard_index(&DataValue::Float64(1.5), 2).is_err());
    }
}
