//! Source and target dialects.
//!
//! Parsing is `sqlparser`'s: PostgreSQL text goes through its
//! `PostgreSqlDialect`, Spark SQL through [`SparkSql`] (a Databricks-flavoured
//! dialect with a small token clean-up), and DuneSQL through `GenericDialect`.
//! What the library does not know about the engines lives here: where NULLs
//! sort, how binary strings were spelled and which type names DuneSQL uses.

use std::any::TypeId;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{ArrayElemTypeDef, DataType, Expr, Ident, ObjectName, ObjectNamePart, Statement, Value};
use sqlparser::dialect::{DatabricksDialect, Dialect, GenericDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

use crate::error::{TranslationError, TranslationResult};

static ERROR_POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*at Line: [0-9]+, Column: [0-9]+").expect("valid error position pattern")
});

/// Joins the names of a Spark `AS (a, b)` alias list inside one identifier.
pub const ALIAS_LIST_SEPARATOR: &str = ",";

/// Where NULLs sort when an `ORDER BY` item does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    /// NULL is the smallest value: first ascending, last descending.
    NullsAreSmall,
    /// NULL is the largest value: last ascending, first descending.
    NullsAreLarge,
    /// NULL always sorts last.
    NullsAreLast,
}

impl NullOrdering {
    /// Implied `NULLS FIRST` for a sort direction.
    pub fn nulls_first(self, desc: bool) -> bool {
        match self {
            NullOrdering::NullsAreSmall => !desc,
            NullOrdering::NullsAreLarge => desc,
            NullOrdering::NullsAreLast => false,
        }
    }
}

/// DuneSQL sorts NULLs last in both directions.
pub const TARGET_NULL_ORDERING: NullOrdering = NullOrdering::NullsAreLast;

/// Engines a query can be migrated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDialect {
    Postgres,
    Spark,
}

impl SourceDialect {
    pub fn null_ordering(self) -> NullOrdering {
        match self {
            // The legacy engine was configured to sort NULLs last in both directions.
            SourceDialect::Postgres => NullOrdering::NullsAreLast,
            SourceDialect::Spark => NullOrdering::NullsAreSmall,
        }
    }
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDialect::Postgres => write!(f, "postgres"),
            SourceDialect::Spark => write!(f, "spark"),
        }
    }
}

impl FromStr for SourceDialect {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(SourceDialect::Postgres),
            "spark" | "sparksql" | "spark_sql" => Ok(SourceDialect::Spark),
            other => Err(TranslationError::InvalidOptionCombination(format!(
                "unsupported source dialect '{}'",
                other
            ))),
        }
    }
}

/// Spark SQL as the legacy engine accepted it: backtick identifiers, strings
/// in single or double quotes with backslash escapes, and `INTERVAL '1 day'`
/// with the unit inside the string.
///
/// Reports itself as Databricks so the parser applies the Spark-family rules
/// (`array(1, 2)` is a call, not an `ARRAY` subquery).
#[derive(Debug, Default)]
pub struct SparkSql;

impl Dialect for SparkSql {
    fn dialect(&self) -> TypeId {
        TypeId::of::<DatabricksDialect>()
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '`'
    }

    fn is_identifier_start(&self, ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_'
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        ch.is_ascii_alphanumeric() || ch == '_'
    }

    fn supports_string_literal_backslash_escape(&self) -> bool {
        true
    }

    fn supports_filter_during_aggregation(&self) -> bool {
        true
    }

    fn supports_lambda_functions(&self) -> bool {
        true
    }
}

/// Plural interval units Spark accepts, with the keyword the parser knows.
const PLURAL_UNITS: &[(&str, &str)] = &[
    ("YEARS", "YEAR"),
    ("MONTHS", "MONTH"),
    ("WEEKS", "WEEK"),
    ("DAYS", "DAY"),
    ("HOURS", "HOUR"),
    ("MINUTES", "MINUTE"),
    ("SECONDS", "SECOND"),
];

fn is_word(token: &Token, value: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(value))
}

/// Bring Spark tokens to what the parser expects: backtick identifiers become
/// double-quoted ones, double-quoted strings become single-quoted strings,
/// plural interval units are singular, and a generator's `AS (a, b)` alias
/// list collapses into one quoted identifier.
fn normalize_spark(mut tokens: Vec<Token>) -> Vec<Token> {
    for token in tokens.iter_mut() {
        match token {
            Token::Word(w) if w.quote_style == Some('`') => w.quote_style = Some('"'),
            Token::DoubleQuotedString(s) => *token = Token::SingleQuotedString(std::mem::take(s)),
            _ => {}
        }
    }

    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t, Token::Whitespace(_)))
        .map(|(i, _)| i)
        .collect();
    let at = |k: usize| significant.get(k).copied();

    for k in 2..significant.len() {
        let (Some(i), Some(prev), Some(before)) = (at(k), at(k - 1), at(k - 2)) else {
            continue;
        };
        let literal = matches!(tokens[prev], Token::Number(..) | Token::SingleQuotedString(_));
        if !literal || !is_word(&tokens[before], "INTERVAL") {
            continue;
        }
        let singular = PLURAL_UNITS
            .iter()
            .find(|(plural, _)| is_word(&tokens[i], plural))
            .map(|(_, unit)| *unit);
        if let Some(unit) = singular {
            tokens[i] = Token::make_keyword(unit);
        }
    }

    let mut k = 1;
    while k + 1 < significant.len() {
        let collapsed = alias_list(&tokens, &significant, k);
        match collapsed {
            Some((names, end)) => {
                let open = significant[k + 1];
                tokens[open] = Token::make_word(&names.join(ALIAS_LIST_SEPARATOR), Some('"'));
                for &i in &significant[k + 2..=end] {
                    tokens[i] = Token::Whitespace(Whitespace::Space);
                }
                k = end + 1;
            }
            None => k += 1,
        }
    }
    tokens
}

/// `) AS ( a , b , ... )` starting at significant position `k` (the `AS`):
/// the names and the significant position of the closing paren.
fn alias_list(tokens: &[Token], significant: &[usize], k: usize) -> Option<(Vec<String>, usize)> {
    let token = |k: usize| significant.get(k).map(|&i| &tokens[i]);
    if !matches!(token(k - 1)?, Token::RParen) || !is_word(token(k)?, "AS") || !matches!(token(k + 1)?, Token::LParen) {
        return None;
    }
    let mut names = Vec::new();
    let mut j = k + 2;
    loop {
        let Token::Word(w) = token(j)? else {
            return None;
        };
        names.push(w.value.clone());
        match token(j + 1)? {
            Token::Comma => j += 2,
            Token::RParen if names.len() > 1 => return Some((names, j + 1)),
            _ => return None,
        }
    }
}

fn parse_error(message: impl fmt::Display) -> TranslationError {
    let message = message.to_string();
    let message = message.strip_prefix("sql parser error: ").unwrap_or(&message);
    TranslationError::Parse(ERROR_POSITION.replace_all(message, "").into_owned())
}

fn non_empty(statements: Vec<Statement>) -> TranslationResult<Vec<Statement>> {
    if statements.is_empty() {
        return Err(TranslationError::Parse("no statement to translate".to_string()));
    }
    Ok(statements)
}

/// Parse `sql` written for `source`.
pub fn parse(sql: &str, source: SourceDialect) -> TranslationResult<Vec<Statement>> {
    let statements = match source {
        SourceDialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(parse_error)?,
        SourceDialect::Spark => {
            let tokens = Tokenizer::new(&SparkSql, sql).tokenize().map_err(parse_error)?;
            Parser::new(&SparkSql)
                .with_tokens(normalize_spark(tokens))
                .parse_statements()
                .map_err(parse_error)?
        }
    };
    non_empty(statements)
}

/// Parse text already written in DuneSQL.
pub fn parse_dunesql(sql: &str) -> TranslationResult<Vec<Statement>> {
    non_empty(Parser::parse_sql(&GenericDialect {}, sql).map_err(parse_error)?)
}

/// Lower-cased digits of a hex-looking string: `0x..` from either engine, and
/// PostgreSQL's `\x..` bytea escape format.
pub fn hex_digits(text: &str, source: SourceDialect) -> Option<String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| match source {
            SourceDialect::Postgres => text.strip_prefix("\\x"),
            SourceDialect::Spark => None,
        })?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(digits.to_ascii_lowercase())
}

/// DuneSQL binary literal for hex digits. Printed as is: `0xdeadbeef`.
pub fn hex_literal(digits: &str) -> Expr {
    Expr::Value(Value::Number(format!("0x{}", digits.to_ascii_lowercase()), false).into())
}

/// A type printed verbatim, with optional modifiers: `VARCHAR`, `ARRAY(VARCHAR)`.
pub fn named_type(name: &str, modifiers: Vec<String>) -> DataType {
    DataType::Custom(
        ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]),
        modifiers,
    )
}

/// Source type name (upper case, no parameters) to the DuneSQL spelling, and
/// whether the parameters carry over.
const TYPE_NAMES: &[(&str, &str, bool)] = &[
    ("INT", "INTEGER", false),
    ("INT4", "INTEGER", false),
    ("INTEGER", "INTEGER", false),
    ("INT2", "SMALLINT", false),
    ("SMALLINT", "SMALLINT", false),
    ("INT8", "BIGINT", false),
    ("BIGINT", "BIGINT", false),
    ("LONG", "BIGINT", false),
    ("BYTE", "TINYINT", false),
    ("INT256", "INT256", false),
    ("UINT256", "UINT256", false),
    ("TINYINT", "TINYINT", false),
    ("FLOAT8", "DOUBLE", false),
    ("FLOAT64", "DOUBLE", false),
    ("DOUBLE", "DOUBLE", false),
    ("DOUBLE PRECISION", "DOUBLE", false),
    ("FLOAT4", "REAL", false),
    ("FLOAT", "REAL", false),
    ("REAL", "REAL", false),
    ("NUMERIC", "DECIMAL", true),
    ("DEC", "DECIMAL", true),
    ("DECIMAL", "DECIMAL", true),
    ("TEXT", "VARCHAR", false),
    ("STRING", "VARCHAR", false),
    ("CHARACTER VARYING", "VARCHAR", true),
    ("VARCHAR", "VARCHAR", true),
    ("BPCHAR", "CHAR", true),
    ("CHARACTER", "CHAR", true),
    ("BYTEA", "VARBINARY", false),
    ("BINARY", "VARBINARY", false),
    ("BOOL", "BOOLEAN", false),
    ("TIMESTAMPTZ", "TIMESTAMP WITH TIME ZONE", false),
    ("JSONB", "JSON", false),
];

/// `NAME(params)` split into the upper-cased name and the parameter list.
fn split_type(text: &str) -> (String, Vec<String>) {
    let (base, params) = match text.split_once('(') {
        Some((base, rest)) => (base, rest.trim_end_matches(')')),
        None => (text, ""),
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    let params = params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    (base, params)
}

/// DuneSQL spelling of a source type, or `None` when it already reads right.
pub fn target_type(ty: &DataType) -> Option<DataType> {
    if let DataType::Array(def) = ty {
        let inner = match def {
            ArrayElemTypeDef::SquareBracket(inner, _)
            | ArrayElemTypeDef::AngleBracket(inner)
            | ArrayElemTypeDef::Parenthesis(inner) => inner,
            ArrayElemTypeDef::None => return None,
        };
        let element = target_type(inner).unwrap_or_else(|| (**inner).clone());
        return Some(named_type("ARRAY", vec![element.to_string()]));
    }
    let text = ty.to_string();
    let (base, params) = split_type(&text);
    let (_, name, keep) = TYPE_NAMES.iter().find(|(from, _, _)| *from == base)?;
    let spelled = named_type(name, if *keep { params } else { Vec::new() });
    (spelled.to_string() != text).then_some(spelled)
}
