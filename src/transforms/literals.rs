//! Literal canonicalisation: strings the source engines coerce implicitly.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{DateTimeField, Expr, Value};

use super::{Parent, PassContext, Rewrite};
use crate::ast::{cast, hex, string, string_literal};
use crate::dialect::hex_digits;

static TIMESTAMP_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}( \d{2}:\d{2}(:\d{2})?)?$").expect("valid timestamp pattern")
});

static INTERVAL_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*([A-Za-z]+)\s*$").expect("valid interval pattern")
});

/// `'true'` / `'false'` become boolean literals.
pub struct BooleanStrings;

impl Rewrite for BooleanStrings {
    fn id(&self) -> &'static str {
        "boolean_strings"
    }

    fn priority(&self) -> u32 {
        1200
    }

    fn rewrite_expr(&self, expr: &mut Expr, parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let value = match string_literal(expr) {
            Some(s) if s.eq_ignore_ascii_case("true") => true,
            Some(s) if s.eq_ignore_ascii_case("false") => false,
            _ => return false,
        };
        if parent == Parent::Cast {
            return false;
        }
        *expr = Expr::Value(Value::Boolean(value).into());
        true
    }
}

/// Date and timestamp shaped strings get an explicit cast, as do quoted
/// parameters named like a date or a time.
pub struct TimestampStrings;

impl Rewrite for TimestampStrings {
    fn id(&self) -> &'static str {
        "timestamp_strings"
    }

    fn priority(&self) -> u32 {
        1100
    }

    fn rewrite_expr(&self, expr: &mut Expr, parent: Parent, ctx: &PassContext<'_>) -> bool {
        let Some(text) = string_literal(expr) else {
            return false;
        };
        let matches = TIMESTAMP_TEXT.is_match(text)
            || ctx.guards.parameter_name(text).is_some_and(|name| {
                let name = name.to_lowercase();
                name.contains("date") || name.contains("time")
            });
        if !matches || parent == Parent::Cast {
            return false;
        }
        cast(expr, "TIMESTAMP")
    }
}

/// `'0x..'` strings, and PostgreSQL's `'\x..'`, become binary literals.
///
/// Strings already wrapped by a cast or a decoding call are left alone. When a
/// schema is present, direct comparison operands are left to the coercion
/// optimizer, which knows the type on the other side.
pub struct HexStrings;

impl Rewrite for HexStrings {
    fn id(&self) -> &'static str {
        "hex_strings"
    }

    fn priority(&self) -> u32 {
        800
    }

    fn rewrite_expr(&self, expr: &mut Expr, parent: Parent, ctx: &PassContext<'_>) -> bool {
        let Some(digits) = string_literal(expr).and_then(|text| hex_digits(text, ctx.source)) else {
            return false;
        };
        let skip = match parent {
            Parent::Cast | Parent::Decode => true,
            Parent::Comparison => ctx.typed,
            Parent::Clause | Parent::Other => false,
        };
        if skip {
            return false;
        }
        *expr = hex(&digits);
        true
    }
}

/// `INTERVAL '1 day'` and `INTERVAL 1 days` become `INTERVAL '1' DAY`.
pub struct IntervalLiterals;

impl IntervalLiterals {
    /// Field to write and the factor to apply to the amount.
    fn unit(raw: &str) -> Option<(DateTimeField, i64)> {
        let lower = raw.to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        Some(match singular {
            "year" => (DateTimeField::Year, 1),
            "quarter" => (DateTimeField::Month, 3),
            "month" => (DateTimeField::Month, 1),
            "week" => (DateTimeField::Day, 7),
            "day" => (DateTimeField::Day, 1),
            "hour" => (DateTimeField::Hour, 1),
            "minute" => (DateTimeField::Minute, 1),
            "second" => (DateTimeField::Second, 1),
            _ => return None,
        })
    }

    /// `amount * factor`, or `None` when the amount is not a whole number or
    /// the product does not fit.
    fn scale(amount: &str, factor: i64) -> Option<String> {
        if factor == 1 {
            return Some(amount.to_string());
        }
        let n: i64 = amount.parse().ok()?;
        match n.checked_mul(factor) {
            Some(scaled) => Some(scaled.to_string()),
            None => {
                tracing::warn!(amount, factor, "interval amount out of range, left as written");
                None
            }
        }
    }
}

impl Rewrite for IntervalLiterals {
    fn id(&self) -> &'static str {
        "interval_literals"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let Expr::Interval(interval) = expr else {
            return false;
        };
        if interval.leading_precision.is_some()
            || interval.last_field.is_some()
            || interval.fractional_seconds_precision.is_some()
        {
            return false;
        }
        let (amount, raw_unit) = match &interval.leading_field {
            None => {
                let Some(text) = string_literal(&interval.value) else {
                    return false;
                };
                let Some(caps) = INTERVAL_TEXT.captures(text) else {
                    tracing::warn!(interval = %text, "interval literal left as written");
                    return false;
                };
                (caps[1].to_string(), caps[2].to_string())
            }
            Some(field) => {
                let amount = match interval.value.as_ref() {
                    Expr::Value(v) => match &v.value {
                        Value::SingleQuotedString(text) => text.trim().to_string(),
                        Value::Number(n, _) => n.clone(),
                        _ => return false,
                    },
                    _ => return false,
                };
                (amount, field.to_string())
            }
        };
        let Some((field, factor)) = Self::unit(&raw_unit) else {
            return false;
        };
        let Some(amount) = Self::scale(&amount, factor) else {
            return false;
        };
        let unchanged = string_literal(&interval.value) == Some(amount.as_str())
            && interval.leading_field.as_ref() == Some(&field);
        if unchanged {
            return false;
        }
        *interval.value = string(&amount);
        interval.leading_field = Some(field);
        true
    }
}
