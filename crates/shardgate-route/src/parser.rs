use crate::rule::DatabaseType;
use shardgate_core::error::RoutingError;
use sqlparser::ast::Statement;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// A statement validated by the SQL parser, kept as a token stream so the
/// router can locate table names and placeholders without re-parsing.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub sql: String,
    pub kind: StatementKind,
    pub tokens: Vec<Token>,
    /// Byte offset of each token in `sql`.
    pub offsets: Vec<usize>,
    pub parameter_count: usize,
}

impl ParsedStatement {
    /// Parameter index bound to the placeholder at `token_index`. Numbered
    /// placeholders (`$n`) name their index; positional ones (`?`) are
    /// counted from the start of the statement.
    pub fn placeholder_ordinal(&self, token_index: usize) -> usize {
        if let Token::Placeholder(text) = &self.tokens[token_index] {
            if let Some(number) = numbered_placeholder(text) {
                return number - 1;
            }
        }
        self.tokens[..token_index]
            .iter()
            .filter(|t| matches!(t, Token::Placeholder(text) if numbered_placeholder(text).is_none()))
            .count()
    }
}

/// `$n` with `n >= 1`.
fn numbered_placeholder(text: &str) -> Option<usize> {
    text.strip_prefix('$')?
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
}

fn parameter_count(tokens: &[Token]) -> usize {
    let mut positional = 0;
    let mut highest = 0;
    for token in tokens {
        if let Token::Placeholder(text) = token {
            match numbered_placeholder(text) {
                Some(number) => highest = highest.max(number),
                None => positional += 1,
            }
        }
    }
    positional.max(highest)
}

/// Trims surrounding whitespace and trailing semicolons.
pub fn normalize_sql(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

pub fn parse_statement(sql: &str, database_type: DatabaseType) -> Result<ParsedStatement, RoutingError> {
    let sql = normalize_sql(sql);
    let dialect = database_type.dialect();
    let statements =
        Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| RoutingError::Parse(e.to_string()))?;
    if statements.len() != 1 {
        return Err(RoutingError::Unsupported(format!(
            "expected exactly one statement, found {}",
            statements.len()
        )));
    }
    let located = Tokenizer::new(dialect.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|e| RoutingError::Parse(e.to_string()))?;

    let line_starts = line_starts(sql);
    let mut tokens = Vec::with_capacity(located.len());
    let mut offsets = Vec::with_capacity(located.len());
    for item in located {
        if matches!(item.token, Token::EOF) {
            continue;
        }
        offsets.push(byte_offset(sql, &line_starts, item.location.line, item.location.column));
        tokens.push(item.token);
    }
    let parameter_count = parameter_count(&tokens);
    let kind = classify(&statements[0], &tokens);
    Ok(ParsedStatement {
        sql: sql.to_string(),
        kind,
        tokens,
        offsets,
        parameter_count,
    })
}

fn classify(statement: &Statement, tokens: &[Token]) -> StatementKind {
    if matches!(statement, Statement::Query(_)) {
        return StatementKind::Select;
    }
    let leading = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.keyword),
        _ => None,
    });
    match leading {
        Some(Keyword::INSERT) | Some(Keyword::REPLACE) => StatementKind::Insert,
        Some(Keyword::UPDATE) => StatementKind::Update,
        Some(Keyword::DELETE) => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

fn line_starts(sql: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (idx, ch) in sql.char_indices() {
        if ch == '\n' {
            starts.push(idx + 1);
        }
    }
    starts
}

// tokenizer locations are 1-based lines and 1-based character columns
fn byte_offset(sql: &str, line_starts: &[usize], line: u64, column: u64) -> usize {
    let line_idx = (line.max(1) - 1) as usize;
    let start = line_starts.get(line_idx).copied().unwrap_or(sql.len());
    let chars = (column.max(1) - 1) as usize;
    sql[start..]
        .char_indices()
        .nth(chars)
        .map(|(idx, _)| start + idx)
        .unwrap_or(sql.len())
}
