//! Cast insertion and cast cleanup.

use sqlparser::ast::{DataType, Expr, Query, SelectItem};

use super::{Parent, PassContext, Rewrite};
use crate::ast::{cast, column, is_call, is_hex, plain_args, selects_mut};
use crate::dialect::{named_type, target_type};

/// Columns named like an amount or a value are read as `DOUBLE`.
///
/// The source engines stored these as arbitrary-precision numerics and
/// compared them freely against floats. A bare column in a projection keeps
/// its output name through an explicit alias.
pub struct NumericColumnCast;

const NUMERIC_HINTS: &[&str] = &["amount", "value"];

impl NumericColumnCast {
    fn wants_cast(expr: &Expr, ctx: &PassContext<'_>) -> bool {
        let Some((_, name)) = column(expr) else {
            return false;
        };
        let lower = name.value.to_lowercase();
        NUMERIC_HINTS.iter().any(|h| lower.contains(h)) && !ctx.guards.is_guard(&name.value)
    }
}

impl Rewrite for NumericColumnCast {
    fn id(&self) -> &'static str {
        "numeric_column_cast"
    }

    fn priority(&self) -> u32 {
        1000
    }

    fn rewrite_query(&self, query: &mut Query, ctx: &PassContext<'_>) -> usize {
        let mut changed = 0;
        for select in selects_mut(&mut query.body) {
            for item in select.projection.iter_mut() {
                let SelectItem::UnnamedExpr(expr) = item else {
                    continue;
                };
                if !Self::wants_cast(expr, ctx) {
                    continue;
                }
                let Some((_, name)) = column(expr) else {
                    continue;
                };
                let alias = name.clone();
                let mut expr = expr.clone();
                if !cast(&mut expr, "DOUBLE") {
                    continue;
                }
                *item = SelectItem::ExprWithAlias { expr, alias };
                changed += 1;
            }
        }
        changed
    }

    fn rewrite_expr(&self, expr: &mut Expr, parent: Parent, ctx: &PassContext<'_>) -> bool {
        if parent == Parent::Cast || !Self::wants_cast(expr, ctx) {
            return false;
        }
        cast(expr, "DOUBLE")
    }
}

/// `LOWER`, `FROM_HEX`/`UNHEX` and casts to `VARBINARY` around a binary
/// literal are no-ops once the literal is native.
pub struct RedundantBinaryCall;

fn spells_varbinary(ty: &DataType) -> bool {
    let spelled = target_type(ty).unwrap_or_else(|| ty.clone());
    spelled.to_string().eq_ignore_ascii_case("VARBINARY")
}

impl Rewrite for RedundantBinaryCall {
    fn id(&self) -> &'static str {
        "redundant_binary_call"
    }

    fn priority(&self) -> u32 {
        700
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let inner = match &*expr {
            Expr::Function(f) if ["lower", "unhex", "from_hex"].iter().any(|n| is_call(f, n)) => {
                match plain_args(f).as_deref() {
                    Some([arg]) => (*arg).clone(),
                    _ => return false,
                }
            }
            Expr::Cast {
                expr: inner,
                data_type,
                format: None,
                ..
            } if spells_varbinary(data_type) => (**inner).clone(),
            _ => return false,
        };
        if !is_hex(&inner) {
            return false;
        }
        *expr = inner;
        true
    }
}

/// `VARCHAR(n)` becomes `VARCHAR`; DuneSQL would truncate to the length.
pub struct VarcharLength;

fn unbounded(ty: &DataType) -> Option<DataType> {
    match ty {
        DataType::Varchar(Some(_))
        | DataType::CharacterVarying(Some(_))
        | DataType::CharVarying(Some(_)) => Some(named_type("VARCHAR", Vec::new())),
        DataType::Array(_) => {
            let element = target_type(ty)?;
            let text = element.to_string();
            let stripped = strip_lengths(&text);
            (stripped != text).then(|| {
                let inner = stripped
                    .strip_prefix("ARRAY(")
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(&stripped)
                    .to_string();
                named_type("ARRAY", vec![inner])
            })
        }
        _ => None,
    }
}

/// `VARCHAR(3)` anywhere in a spelled type becomes `VARCHAR`.
fn strip_lengths(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find("VARCHAR(") {
        let (head, tail) = rest.split_at(at + "VARCHAR".len());
        out.push_str(head);
        rest = match tail.find(')') {
            Some(close) => &tail[close + 1..],
            None => tail,
        };
    }
    out.push_str(rest);
    out
}

impl Rewrite for VarcharLength {
    fn id(&self) -> &'static str {
        "varchar_length"
    }

    fn priority(&self) -> u32 {
        500
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let Expr::Cast { data_type, .. } = expr else {
            return false;
        };
        let Some(to) = unbounded(data_type) else {
            return false;
        };
        *data_type = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SourceDialect;
    use crate::transforms::test_support::run_one;
    use pretty_assertions::assert_eq;

    const PG: SourceDialect = SourceDialect::Postgres;

    #[test]
    fn test_numeric_columns() {
        assert_eq!(
            run_one(
                &NumericColumnCast,
                "SELECT t.usd_amount, value AS v, name FROM t WHERE amount_raw > 10",
                PG
            ),
            "SELECT CAST(t.usd_amount AS DOUBLE) AS usd_amount, CAST(value AS DOUBLE) AS v, name FROM t WHERE CAST(amount_raw AS DOUBLE) > 10"
        );
    }

    #[test]
    fn test_numeric_column_already_cast() {
        assert_eq!(
            run_one(&NumericColumnCast, "SELECT SUM(amount::numeric) FROM t", PG),
            "SELECT SUM(CAST(amount AS DECIMAL)) FROM t"
        );
    }

    #[test]
    fn test_numeric_guard_skipped() {
        assert_eq!(
            run_one(&NumericColumnCast, "SELECT * FROM t WHERE x > {{min value}}", PG),
            "SELECT * FROM t WHERE x > {{min value}}"
        );
    }

    #[test]
    fn test_redundant_calls() {
        assert_eq!(
            run_one(
                &RedundantBinaryCall,
                "SELECT LOWER(X'AB'), from_hex(X'cd'), CAST(X'ef' AS bytea), LOWER(name)",
                PG
            ),
            "SELECT 0xab, 0xcd, 0xef, LOWER(name)"
        );
    }

    #[test]
    fn test_varchar_length() {
        assert_eq!(
            run_one(
                &VarcharLength,
                "SELECT CAST(a AS VARCHAR(42)), b::varchar(3)[], CAST(c AS CHAR(2))",
                PG
            ),
            "SELECT CAST(a AS VARCHAR), CAST(b AS ARRAY(VARCHAR)), CAST(c AS CHAR(2))"
        );
    }

    #[test]
    fn test_strip_lengths() {
        assert_eq!(strip_lengths("ARRAY(VARCHAR(3))"), "ARRAY(VARCHAR)");
        assert_eq!(strip_lengths("ARRAY(BIGINT)"), "ARRAY(BIGINT)");
    }
}
