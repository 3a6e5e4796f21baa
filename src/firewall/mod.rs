//! SQL statement firewall
//!
//! Token-level screening of simple-query text before it is forwarded
//! upstream. SELECT statements must read from exactly one allowed table and
//! carry every required condition verbatim in their WHERE clause; all other
//! statement types pass unchecked (write access is the service account's
//! problem, read access is what the policy narrows).
//!
//! The match is textual, not semantic: a required condition is satisfied
//! only by a top-level AND conjunct whose source text equals it exactly.
//! `WHERE app='x' OR admin=1` does not satisfy `app='x'` because the
//! top-level fragment is the whole OR expression.

use std::fmt;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Policy evaluated against every SELECT on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Tables a SELECT may name in FROM
    pub allowed_tables: Vec<String>,
    /// Conjuncts that must appear verbatim in every WHERE clause
    pub required_conditions: Vec<String>,
}

impl QueryPolicy {
    pub fn new(allowed_tables: Vec<String>, required_conditions: Vec<String>) -> Self {
        Self {
            allowed_tables,
            required_conditions,
        }
    }

    /// Policy for an authenticated proxy user: reads are fenced to the
    /// configured tables and to rows tagged with the user's own app.
    pub fn for_user(user: &str, allowed_tables: Vec<String>) -> Self {
        Self::new(allowed_tables, vec![format!("app='{}'", user)])
    }
}

/// Outcome of evaluating one query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(DenialReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The tokenizer could not make sense of the text
    ParseFailure(String),
    /// Parenthesized subexpression in the select list
    SelectSubexpression,
    /// SELECT without a FROM clause
    NoTable,
    /// More than one table referenced (comma list or join)
    MultipleTables,
    /// FROM names a subquery instead of a table
    SubqueryTable,
    /// Table is not on the allowed list
    TableNotAllowed(String),
    /// SELECT without a WHERE clause
    MissingWhereClause,
    /// A required condition is absent from the WHERE conjuncts
    MissingCondition(String),
}

impl DenialReason {
    /// Short, stable phrase naming the denial kind. Safe to put in a
    /// client-visible error; the full `Display` form carries internal
    /// detail and belongs in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseFailure(_) => "statement could not be parsed",
            Self::SelectSubexpression => "subquery in select list",
            Self::NoTable => "no table",
            Self::MultipleTables => "multiple tables",
            Self::SubqueryTable => "subquery in place of a table",
            Self::TableNotAllowed(_) => "table is not allowed",
            Self::MissingWhereClause => "missing WHERE clause",
            Self::MissingCondition(_) => "missing required condition",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure(msg) => write!(f, "could not parse statement: {}", msg),
            Self::SelectSubexpression => write!(f, "subquery in select list"),
            Self::NoTable => write!(f, "no table"),
            Self::MultipleTables => write!(f, "multiple tables"),
            Self::SubqueryTable => write!(f, "subquery in place of a table"),
            Self::TableNotAllowed(table) => write!(f, "table \"{}\" is not allowed", table),
            Self::MissingWhereClause => write!(f, "missing WHERE clause"),
            Self::MissingCondition(cond) => {
                write!(f, "missing required condition {}", cond)
            }
        }
    }
}

/// Evaluate query text against a policy. Multi-statement text is allowed
/// only if every statement passes.
pub fn evaluate(sql: &str, policy: &QueryPolicy) -> Verdict {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => return Verdict::Denied(DenialReason::ParseFailure(err.to_string())),
    };

    for statement in split_statements(&tokens) {
        if let Some(reason) = check_statement(statement, policy) {
            return Verdict::Denied(reason);
        }
    }
    Verdict::Allowed
}

/// Split a token stream on semicolons. String literals and comments are
/// single tokens by this point, so a plain split is exact.
fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(|t| matches!(t, Token::SemiColon))
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

fn keyword_of(token: &Token) -> Option<Keyword> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.keyword),
        _ => None,
    }
}

fn is_whitespace(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_))
}

fn is_join_keyword(kw: Keyword) -> bool {
    matches!(
        kw,
        Keyword::JOIN
            | Keyword::INNER
            | Keyword::LEFT
            | Keyword::RIGHT
            | Keyword::FULL
            | Keyword::CROSS
            | Keyword::OUTER
            | Keyword::NATURAL
    )
}

/// Keywords that end the WHERE clause when seen at paren depth zero.
fn ends_where_clause(kw: Keyword) -> bool {
    matches!(
        kw,
        Keyword::GROUP | Keyword::ORDER | Keyword::HAVING | Keyword::LIMIT | Keyword::OFFSET
    )
}

/// Check one statement; `None` means it passes.
fn check_statement(tokens: &[Token], policy: &QueryPolicy) -> Option<DenialReason> {
    // Statement type is the first non-whitespace token. Anything but a
    // plain SELECT passes unconditionally.
    let first = tokens.iter().position(|t| !is_whitespace(t))?;
    if keyword_of(&tokens[first]) != Some(Keyword::SELECT) {
        return None;
    }

    // Locate the top-level clause boundaries in one pass.
    let mut depth = 0usize;
    let mut from_idx = None;
    let mut where_idx = None;
    let mut where_end = None;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => {
                depth += 1;
                continue;
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth > 0 {
            continue;
        }
        if let Some(kw) = keyword_of(token) {
            match kw {
                Keyword::FROM if from_idx.is_none() => from_idx = Some(i),
                Keyword::WHERE if where_idx.is_none() => where_idx = Some(i),
                kw if where_idx.is_some() && where_end.is_none() && ends_where_clause(kw) => {
                    where_end = Some(i)
                }
                _ => {}
            }
        }
    }

    // Select list: any parenthesized subexpression is refused.
    let select_end = from_idx.unwrap_or(tokens.len());
    if tokens[first + 1..select_end]
        .iter()
        .any(|t| matches!(t, Token::LParen))
    {
        return Some(DenialReason::SelectSubexpression);
    }

    let from_idx = match from_idx {
        Some(i) => i,
        None => return Some(DenialReason::NoTable),
    };
    let from_end = where_idx.unwrap_or(tokens.len());
    if let Some(reason) = check_from_clause(&tokens[from_idx + 1..from_end], policy) {
        return Some(reason);
    }

    let where_idx = match where_idx {
        Some(i) => i,
        None => return Some(DenialReason::MissingWhereClause),
    };
    let clause = &tokens[where_idx + 1..where_end.unwrap_or(tokens.len())];
    let fragments = split_conjuncts(clause);
    for condition in &policy.required_conditions {
        if !fragments.iter().any(|f| f == condition) {
            return Some(DenialReason::MissingCondition(condition.clone()));
        }
    }
    None
}

/// The FROM clause must name exactly one bare table, optionally aliased.
fn check_from_clause(clause: &[Token], policy: &QueryPolicy) -> Option<DenialReason> {
    let mut depth = 0usize;
    let mut table: Option<String> = None;
    let mut alias_seen = false;
    let mut dotted = false;

    for token in clause {
        match token {
            Token::LParen => {
                if depth == 0 && table.is_none() {
                    return Some(DenialReason::SubqueryTable);
                }
                depth += 1;
                continue;
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth > 0 || is_whitespace(token) {
            continue;
        }
        match token {
            Token::Comma => return Some(DenialReason::MultipleTables),
            Token::Period => {
                dotted = true;
            }
            Token::Word(w) => {
                if let Some(kw) = keyword_of(token) {
                    if is_join_keyword(kw) {
                        return Some(DenialReason::MultipleTables);
                    }
                    if kw == Keyword::AS {
                        continue;
                    }
                }
                match &mut table {
                    None => table = Some(w.value.clone()),
                    // Schema-qualified names are compared in full.
                    Some(name) if dotted => {
                        name.push('.');
                        name.push_str(&w.value);
                        dotted = false;
                    }
                    Some(_) if !alias_seen => alias_seen = true,
                    Some(_) => return Some(DenialReason::MultipleTables),
                }
            }
            other => {
                return Some(DenialReason::ParseFailure(format!(
                    "unexpected token in FROM clause: {}",
                    other
                )))
            }
        }
    }

    match table {
        None => Some(DenialReason::NoTable),
        Some(name) if !policy.allowed_tables.iter().any(|t| *t == name) => {
            Some(DenialReason::TableNotAllowed(name))
        }
        Some(_) => None,
    }
}

/// Split a WHERE clause on top-level AND, reconstructing each conjunct's
/// exact source text. Parenthesized groups stay intact: an OR wrapped in
/// parens is one fragment.
fn split_conjuncts(clause: &[Token]) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for token in clause {
        if depth == 0 && keyword_of(token) == Some(Keyword::AND) {
            fragments.push(std::mem::take(&mut current));
            continue;
        }
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push_str(&token.to_string());
    }
    fragments.push(current);

    fragments
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}
