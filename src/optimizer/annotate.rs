//! Bottom-up type inference.
//!
//! Column types come from qualification, which knows which source each column
//! belongs to. Everything else is derived from the expression itself.

use sqlparser::ast::{BinaryOperator, Expr, SelectItem, SetExpr, TypedString, UnaryOperator, Value};

use super::types::{TypeKind, widens_to};
use crate::ast::{column, function_name, plain_args};

/// Where column types are looked up.
pub trait ColumnTypes {
    /// Type of `qualifier.name`, or of an unqualified `name`.
    fn column_type(&self, qualifier: Option<&str>, name: &str) -> Option<TypeKind>;
}

const VARCHAR_FUNCTIONS: &[&str] = &[
    "lower", "upper", "concat", "substr", "substring", "trim", "ltrim", "rtrim", "replace",
    "to_hex", "date_format", "format", "json_extract_scalar", "lpad", "rpad", "split_part",
    "regexp_extract", "regexp_replace", "reverse", "from_utf8", "cast_to_varchar",
];
const VARBINARY_FUNCTIONS: &[&str] = &[
    "from_hex", "unhex", "bytearray_concat", "bytearray_substring", "to_utf8", "keccak",
    "bytearray_ltrim", "bytearray_rtrim", "from_base58",
];
const BIGINT_FUNCTIONS: &[&str] = &[
    "count", "count_if", "approx_distinct", "bytearray_to_bigint", "bytearray_length", "length",
    "cardinality", "strpos", "date_diff", "year", "quarter", "month", "week", "day", "hour",
    "minute", "second", "day_of_week", "row_number", "rank", "dense_rank",
];
const DOUBLE_FUNCTIONS: &[&str] = &[
    "avg", "stddev", "variance", "ln", "log10", "log2", "sqrt", "power", "pow", "exp", "rand",
    "percent_rank", "cume_dist", "approx_percentile", "to_unixtime",
];
const TIMESTAMP_FUNCTIONS: &[&str] = &[
    "now", "current_timestamp", "localtimestamp", "date_trunc", "from_unixtime", "date_parse",
    "date_add", "from_iso8601_timestamp",
];
/// Functions typed like their first argument.
const PASSTHROUGH_FUNCTIONS: &[&str] = &[
    "min", "max", "sum", "abs", "coalesce", "nullif", "greatest", "least", "round", "floor",
    "ceil", "ceiling", "any_value", "arbitrary", "lag", "lead", "first_value", "last_value",
    "nth_value", "max_by", "min_by",
];

fn in_list(list: &[&str], name: &str) -> bool {
    list.iter().any(|f| f.eq_ignore_ascii_case(name))
}

fn number_type(text: &str) -> TypeKind {
    if text.contains(['e', 'E']) {
        TypeKind::Double
    } else if text.contains('.') {
        TypeKind::Decimal
    } else {
        match text.parse::<i64>() {
            Ok(n) if i32::try_from(n).is_ok() => TypeKind::Integer,
            Ok(_) => TypeKind::BigInt,
            Err(_) => TypeKind::Decimal,
        }
    }
}

/// Wider of two numeric types, or the left one.
fn arithmetic(left: Option<TypeKind>, right: Option<TypeKind>) -> Option<TypeKind> {
    match (left, right) {
        (Some(l), Some(r)) if widens_to(l, r) => Some(r),
        (Some(l), _) => Some(l),
        (None, r) => r,
    }
}

fn value_type(value: &Value) -> Option<TypeKind> {
    match value {
        Value::Number(n, _) => Some(number_type(n)),
        Value::SingleQuotedString(_) | Value::DoubleQuotedString(_) | Value::EscapedStringLiteral(_) => {
            Some(TypeKind::Varchar)
        }
        Value::HexStringLiteral(_) => Some(TypeKind::Varbinary),
        Value::Boolean(_) => Some(TypeKind::Boolean),
        _ => None,
    }
}

fn function_type(f: &sqlparser::ast::Function, columns: &dyn ColumnTypes) -> Option<TypeKind> {
    let name = function_name(f)?;
    if in_list(VARCHAR_FUNCTIONS, name) {
        Some(TypeKind::Varchar)
    } else if in_list(VARBINARY_FUNCTIONS, name) {
        Some(TypeKind::Varbinary)
    } else if in_list(BIGINT_FUNCTIONS, name) {
        Some(TypeKind::BigInt)
    } else if in_list(DOUBLE_FUNCTIONS, name) {
        Some(TypeKind::Double)
    } else if in_list(TIMESTAMP_FUNCTIONS, name) {
        Some(TypeKind::Timestamp)
    } else if in_list(&["current_date", "date"], name) {
        Some(TypeKind::Date)
    } else if name.eq_ignore_ascii_case("bytearray_to_uint256") {
        Some(TypeKind::UInt256)
    } else if name.eq_ignore_ascii_case("bytearray_to_int256") {
        Some(TypeKind::Int256)
    } else if in_list(PASSTHROUGH_FUNCTIONS, name) {
        plain_args(f)?.first().and_then(|a| infer(a, columns))
    } else {
        None
    }
}

/// Type of `expr`, when it can be known.
pub fn infer(expr: &Expr, columns: &dyn ColumnTypes) -> Option<TypeKind> {
    match expr {
        Expr::Value(v) => value_type(&v.value),
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
            let (qualifier, name) = column(expr)?;
            columns.column_type(qualifier.last().map(|q| q.value.as_str()), &name.value)
        }
        Expr::Cast { data_type, .. } => Some(TypeKind::of(data_type)),
        Expr::TypedString(TypedString { data_type, .. }) => Some(TypeKind::of(data_type)),
        Expr::Nested(inner) => infer(inner, columns),
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::And
            | BinaryOperator::Or => Some(TypeKind::Boolean),
            BinaryOperator::StringConcat => {
                let binary = [left, right]
                    .iter()
                    .all(|e| infer(e, columns).is_some_and(TypeKind::is_binary));
                Some(if binary {
                    TypeKind::Varbinary
                } else {
                    TypeKind::Varchar
                })
            }
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => arithmetic(infer(left, columns), infer(right, columns)),
            _ => None,
        },
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => Some(TypeKind::Boolean),
        Expr::UnaryOp { expr, .. } => infer(expr, columns),
        Expr::IsNull(_)
        | Expr::IsNotNull(_)
        | Expr::IsTrue(_)
        | Expr::IsFalse(_)
        | Expr::IsDistinctFrom(..)
        | Expr::IsNotDistinctFrom(..)
        | Expr::InList { .. }
        | Expr::InSubquery { .. }
        | Expr::Between { .. }
        | Expr::Like { .. }
        | Expr::ILike { .. }
        | Expr::Exists { .. } => Some(TypeKind::Boolean),
        Expr::Function(f) => function_type(f, columns),
        Expr::Case {
            conditions,
            else_result,
            ..
        } => conditions
            .iter()
            .map(|when| &when.result)
            .chain(else_result.as_deref())
            .find_map(|e| infer(e, columns)),
        Expr::Interval(_) => Some(TypeKind::Interval),
        Expr::Extract { .. } => Some(TypeKind::BigInt),
        Expr::Array(_) => Some(TypeKind::Array),
        Expr::Subquery(query) => match query.body.as_ref() {
            SetExpr::Select(select) => match select.projection.first()? {
                SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => infer(e, columns),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
