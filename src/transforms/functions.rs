//! Function renames and call reshaping.

use sqlparser::ast::{Array, BinaryOperator, Expr, FunctionArguments};

use super::{Parent, PassContext, Rewrite};
use crate::ast::{expr_template, is_call, is_hex, part_ident_mut, plain_args};
use crate::dialect::SourceDialect;

/// `bytea2numeric(x)` is `bytearray_to_bigint(x)` in DuneSQL.
pub struct LegacyFunctionRename;

impl Rewrite for LegacyFunctionRename {
    fn id(&self) -> &'static str {
        "legacy_function_rename"
    }

    fn priority(&self) -> u32 {
        900
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let Expr::Function(f) = expr else {
            return false;
        };
        if !is_call(f, "bytea2numeric") {
            return false;
        }
        match f.name.0.last_mut().and_then(part_ident_mut) {
            Some(ident) => {
                ident.value = "bytearray_to_bigint".to_string();
                ident.quote_style = None;
                true
            }
            None => false,
        }
    }
}

/// Concatenating binary literals needs `bytearray_concat`, which takes exactly
/// two arguments. `||` chains fold left.
pub struct BinaryConcat;

const BYTEARRAY_CONCAT: &str = "bytearray_concat";

fn binary_operand(expr: &Expr) -> bool {
    is_hex(expr) || matches!(expr, Expr::Function(f) if is_call(f, BYTEARRAY_CONCAT))
}

impl Rewrite for BinaryConcat {
    fn id(&self) -> &'static str {
        "binary_concat"
    }

    fn priority(&self) -> u32 {
        600
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        let (left, right) = match &*expr {
            Expr::Function(f) if is_call(f, "concat") => match plain_args(f).as_deref() {
                Some([left, right]) => (*left, *right),
                _ => return false,
            },
            Expr::BinaryOp {
                left,
                op: BinaryOperator::StringConcat,
                right,
            } => (left.as_ref(), right.as_ref()),
            _ => return false,
        };
        if !binary_operand(left) || !binary_operand(right) {
            return false;
        }
        let args = vec![left.clone(), right.clone()];
        match expr_template(&format!("{}(__0, __1)", BYTEARRAY_CONCAT), args) {
            Some(call) => {
                *expr = call;
                true
            }
            None => false,
        }
    }
}

/// Spellings DuneSQL does not accept: `current_timestamp()`, Spark's
/// `array(..)` constructor and `ILIKE`.
pub struct TargetSpellings;

impl TargetSpellings {
    fn replacement(expr: &Expr, ctx: &PassContext<'_>) -> Option<Expr> {
        match expr {
            Expr::Function(f) if is_call(f, "current_timestamp") && f.over.is_none() => match &f.args {
                FunctionArguments::List(list) if list.args.is_empty() => expr_template("now()", Vec::new()),
                _ => None,
            },
            Expr::Function(f) if ctx.source == SourceDialect::Spark && is_call(f, "array") && f.name.0.len() == 1 => {
                let elem = plain_args(f)?.into_iter().cloned().collect();
                Some(Expr::Array(Array { elem, named: true }))
            }
            Expr::ILike {
                negated,
                any: false,
                expr,
                pattern,
                escape_char: None,
            } => {
                let like = if *negated { "NOT LIKE" } else { "LIKE" };
                expr_template(
                    &format!("LOWER(__0) {} LOWER(__1)", like),
                    vec![(**expr).clone(), (**pattern).clone()],
                )
            }
            _ => None,
        }
    }
}

impl Rewrite for TargetSpellings {
    fn id(&self) -> &'static str {
        "target_spellings"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn rewrite_expr(&self, expr: &mut Expr, _parent: Parent, ctx: &PassContext<'_>) -> bool {
        match Self::replacement(expr, ctx) {
            Some(replacement) => {
                *expr = replacement;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::run_one;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bytea2numeric() {
        assert_eq!(
            run_one(
                &LegacyFunctionRename,
                "SELECT bytea2numeric(substr(data, 1, 32)) FROM t",
                SourceDialect::Postgres
            ),
            "SELECT bytearray_to_bigint(SUBSTR(data, 1, 32)) FROM t"
        );
    }

    #[test]
    fn test_concat_of_hex() {
        assert_eq!(
            run_one(
                &BinaryConcat,
                "SELECT concat(0x01, 0x02), concat(0x01, name), 0x01 || 0x02 || 0x03",
                SourceDialect::Spark
            ),
            "SELECT bytearray_concat(0x01, 0x02), CONCAT(0x01, name), bytearray_concat(bytearray_concat(0x01, 0x02), 0x03)"
        );
    }

    #[test]
    fn test_mixed_pipe_chain_folds_hex_prefix() {
        assert_eq!(
            run_one(&BinaryConcat, "SELECT 0x01 || 0x02 || name", SourceDialect::Spark),
            "SELECT bytearray_concat(0x01, 0x02) || name"
        );
    }

    #[test]
    fn test_target_spellings() {
        assert_eq!(
            run_one(
                &TargetSpellings,
                "SELECT current_timestamp(), current_timestamp, array(1, 2) FROM t WHERE a ILIKE 'x%' AND b NOT ILIKE 'y'",
                SourceDialect::Spark
            ),
            "SELECT NOW(), CURRENT_TIMESTAMP, ARRAY[1, 2] FROM t WHERE LOWER(a) LIKE LOWER('x%') AND LOWER(b) NOT LIKE LOWER('y')"
        );
    }
}
