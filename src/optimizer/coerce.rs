//! Explicit casts for mixed-type comparisons.

use std::ops::ControlFlow;

use sqlparser::ast::{Expr, Query, VisitMut, VisitorMut};

use super::annotate::{ColumnTypes, infer};
use super::types::{TypeKind, widens_to};
use crate::ast::{cast, expr_template, hex, is_comparison, string, string_literal};
use crate::dialect::{SourceDialect, hex_digits};

/// Replace `operand`, of kind `own`, so it compares against a value of kind
/// `other`.
fn coerce_operand(operand: &mut Expr, own: TypeKind, other: TypeKind, source: SourceDialect) -> bool {
    if own.is_binary() && other.is_text() {
        return cast(operand, "VARCHAR");
    }
    if own.is_text() && other.is_binary() {
        let Some(text) = string_literal(operand) else {
            return false;
        };
        return match hex_digits(text, source) {
            // PostgreSQL's `'\x..'` is already binary.
            Some(digits) if text.starts_with('\\') => {
                *operand = hex(&digits);
                true
            }
            Some(digits) => match expr_template("FROM_HEX(__0)", vec![string(&digits)]) {
                Some(call) => {
                    *operand = call;
                    true
                }
                None => false,
            },
            None => cast(operand, "VARBINARY"),
        };
    }
    match other.sql_name() {
        Some(name) if widens_to(own, other) => cast(operand, name),
        _ => false,
    }
}

/// Which operand, if either, a text/binary pair converts: `Some(true)` for
/// the left one.
///
/// A text column against a binary value converts the binary side; a binary
/// column against a text literal converts the literal.
fn text_binary_side(left: &Expr, right: &Expr, lt: TypeKind, rt: TypeKind) -> Option<bool> {
    if lt.is_text() && rt.is_binary() {
        return Some(string_literal(left).is_some());
    }
    if lt.is_binary() && rt.is_text() {
        return Some(string_literal(right).is_none());
    }
    None
}

struct Coercion<'a> {
    columns: &'a dyn ColumnTypes,
    source: SourceDialect,
    /// Nested queries are coerced with their own scope.
    depth: usize,
    changed: usize,
}

impl Coercion<'_> {
    fn compare(&mut self, left: &mut Expr, right: &mut Expr) {
        let (Some(lt), Some(rt)) = (infer(left, self.columns), infer(right, self.columns)) else {
            return;
        };
        if lt == rt {
            return;
        }
        let source = self.source;
        let coerced = match text_binary_side(left, right, lt, rt) {
            Some(true) => coerce_operand(left, lt, rt, source),
            Some(false) => coerce_operand(right, rt, lt, source),
            None => coerce_operand(left, lt, rt, source) || coerce_operand(right, rt, lt, source),
        };
        if coerced {
            tracing::debug!(left = ?lt, right = ?rt, "comparison coerced");
            self.changed += 1;
        }
    }

    /// `'0x..'` operands nobody typed as text become hex literals.
    fn hex_fallback(&self, operand: &mut Expr, other: &Expr) {
        let Some(digits) = string_literal(operand).and_then(|text| hex_digits(text, self.source)) else {
            return;
        };
        if infer(other, self.columns).is_some_and(TypeKind::is_text) {
            return;
        }
        *operand = hex(&digits);
    }
}

impl VisitorMut for Coercion<'_> {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &mut Query) -> ControlFlow<()> {
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<()> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        if let Expr::BinaryOp { left, op, right } = expr {
            if is_comparison(op) {
                self.compare(left, right);
                self.hex_fallback(left, right);
                self.hex_fallback(right, left);
            }
        }
        ControlFlow::Continue(())
    }
}

/// Cast operands of every comparison in `node`, outside nested queries, so
/// both sides share a type. Hex-looking strings left over become binary
/// literals unless compared against text. Returns the number of comparisons
/// rewritten.
pub fn coerce<T: VisitMut + ?Sized>(node: &mut T, columns: &dyn ColumnTypes, source: SourceDialect) -> usize {
    let mut coercion = Coercion {
        columns,
        source,
        depth: 0,
        changed: 0,
    };
    let _ = node.visit(&mut coercion);
    coercion.changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::parse;
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;
    use sqlparser::ast::{SetExpr, Statement};

    /// Columns of one table `tbl`.
    struct Table(Vec<(&'static str, TypeKind)>);

    impl ColumnTypes for Table {
        fn column_type(&self, _qualifier: Option<&str>, name: &str) -> Option<TypeKind> {
            self.0.iter().find(|(c, _)| *c == name).map(|(_, t)| *t)
        }
    }

    fn coerced(sql: &str, table: &[(&'static str, TypeKind)], source: SourceDialect) -> String {
        let mut statements = parse(sql, source).unwrap();
        let Some(Statement::Query(query)) = statements.first_mut() else {
            panic!("not a query");
        };
        let SetExpr::Select(select) = query.body.as_mut() else {
            panic!("not a select");
        };
        coerce(select.as_mut(), &Table(table.to_vec()), source);
        Renderer::new(source, false).render(&mut statements)
    }

    const SPARK: SourceDialect = SourceDialect::Spark;

    #[test]
    fn test_literal_widens_to_column() {
        assert_eq!(
            coerced("SELECT col = 1 FROM tbl", &[("col", TypeKind::Double)], SPARK),
            "SELECT col = CAST(1 AS DOUBLE) FROM tbl"
        );
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE 2.5 < n", &[("n", TypeKind::Integer)], SPARK),
            "SELECT * FROM tbl WHERE 2.5 < CAST(n AS DECIMAL)"
        );
    }

    #[test]
    fn test_binary_column_against_text() {
        let table = [("addr", TypeKind::Varbinary), ("name", TypeKind::Varchar)];
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE addr = '0xDEADbeef'", &table, SPARK),
            "SELECT * FROM tbl WHERE addr = FROM_HEX('deadbeef')"
        );
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE addr = 'abc'", &table, SPARK),
            "SELECT * FROM tbl WHERE addr = CAST('abc' AS VARBINARY)"
        );
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE name = addr", &table, SPARK),
            "SELECT * FROM tbl WHERE name = CAST(addr AS VARCHAR)"
        );
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE name = X'ab'", &table, SPARK),
            "SELECT * FROM tbl WHERE name = CAST(0xab AS VARCHAR)"
        );
    }

    #[test]
    fn test_postgres_bytea_text_against_binary() {
        let table = [("addr", TypeKind::Varbinary)];
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE addr = '\\xDEADbeef'", &table, SourceDialect::Postgres),
            "SELECT * FROM tbl WHERE addr = 0xdeadbeef"
        );
    }

    #[test]
    fn test_incomparable_left_alone() {
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE name = 1", &[("name", TypeKind::Varchar)], SPARK),
            "SELECT * FROM tbl WHERE name = 1"
        );
    }

    #[test]
    fn test_hex_fallback() {
        let table = [("name", TypeKind::Varchar), ("x", TypeKind::Integer)];
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE name = '0xab' AND x = '0xcd'", &table, SPARK),
            "SELECT * FROM tbl WHERE name = '0xab' AND x = 0xcd"
        );
    }

    #[test]
    fn test_nested_queries_skipped() {
        let table = [("col", TypeKind::Double)];
        assert_eq!(
            coerced("SELECT * FROM tbl WHERE EXISTS (SELECT 1 FROM u WHERE col = 1)", &table, SPARK),
            "SELECT * FROM tbl WHERE EXISTS (SELECT 1 FROM u WHERE col = 1)"
        );
    }
}
