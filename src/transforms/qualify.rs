//! `QUALIFY` is not DuneSQL. The filtered SELECT moves into a derived table
//! and the condition becomes the outer `WHERE`; window calls in the condition
//! are computed inside as `_w` columns.

use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, Ident, OrderBy, OrderByKind, Query, Select, SelectItem, SetExpr, TableFactor, Value,
    visit_expressions_mut,
};

use super::{PassContext, Rewrite};
use crate::ast::{column, same, select_template, selects_mut};

const DERIVED: &str = "_t";
const WINDOW_COLUMN: &str = "_w";

pub struct EliminateQualify;

/// How the outer SELECT refers to one inner projection item.
enum Output {
    Named(Ident),
    Star,
}

fn outputs(select: &Select) -> Option<Vec<Output>> {
    select
        .projection
        .iter()
        .map(|item| match item {
            SelectItem::ExprWithAlias { alias, .. } => Some(Output::Named(alias.clone())),
            SelectItem::UnnamedExpr(expr) => column(expr).map(|(_, name)| Output::Named(name.clone())),
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => Some(Output::Star),
            #[allow(unreachable_patterns)]
            _ => None,
        })
        .collect()
}

fn unique(taken: &[String], base: &str) -> String {
    let mut name = base.to_string();
    let mut n = 2;
    while taken.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}

/// ORDER BY the outer query can still evaluate.
fn movable_order(order_by: &Option<OrderBy>, names: &[String]) -> bool {
    let Some(order_by) = order_by else {
        return true;
    };
    let OrderByKind::Expressions(items) = &order_by.kind else {
        return false;
    };
    items.iter().all(|item| match &item.expr {
        Expr::Identifier(name) => names.iter().any(|n| same(name, n)),
        Expr::Value(v) => matches!(v.value, Value::Number(..)),
        _ => false,
    })
}

fn derived_query(outer: &mut Select) -> Option<&mut Query> {
    match &mut outer.from.first_mut()?.relation {
        TableFactor::Derived { subquery, .. } => Some(subquery.as_mut()),
        _ => None,
    }
}

/// The outer SELECT standing in for `select`, and the names it can see.
fn eliminate(select: &Select) -> Option<(Select, Vec<String>)> {
    let mut cond = select.qualify.clone()?;
    let Some(outputs) = outputs(select) else {
        tracing::warn!("QUALIFY over an unnamed projection left as written");
        return None;
    };
    let mut inner = select.clone();
    inner.qualify = None;
    let mut taken: Vec<String> = outputs
        .iter()
        .filter_map(|o| match o {
            Output::Named(name) => Some(name.value.clone()),
            Output::Star => None,
        })
        .collect();

    let mut windows = Vec::new();
    let _ = visit_expressions_mut(&mut cond, |expr| {
        if matches!(expr, Expr::Function(f) if f.over.is_some()) {
            let name = unique(&taken, WINDOW_COLUMN);
            taken.push(name.clone());
            let window = std::mem::replace(expr, Expr::Identifier(Ident::new(name.clone())));
            windows.push(SelectItem::ExprWithAlias {
                expr: window,
                alias: Ident::new(name),
            });
        }
        ControlFlow::<()>::Continue(())
    });
    inner.projection.extend(windows);

    let _ = visit_expressions_mut(&mut cond, |expr| {
        if let Expr::CompoundIdentifier(parts) = expr {
            if let Some(name) = parts.pop() {
                *expr = Expr::Identifier(name);
            }
        }
        ControlFlow::<()>::Continue(())
    });

    let mut outer = select_template(
        &format!("SELECT * FROM (SELECT 1) AS {} WHERE __0", DERIVED),
        vec![cond],
    )?;
    let star = outer.projection.pop()?;
    outer.projection = outputs
        .into_iter()
        .map(|o| match o {
            Output::Named(name) => SelectItem::UnnamedExpr(Expr::Identifier(name)),
            Output::Star => star.clone(),
        })
        .collect();
    derived_query(&mut outer)?.body = Box::new(SetExpr::Select(Box::new(inner)));
    Some((outer, taken))
}

impl Rewrite for EliminateQualify {
    fn id(&self) -> &'static str {
        "eliminate_qualify"
    }

    fn priority(&self) -> u32 {
        300
    }

    fn rewrite_query(&self, query: &mut Query, _ctx: &PassContext<'_>) -> usize {
        if let SetExpr::Select(select) = query.body.as_mut() {
            let Some((mut outer, taken)) = eliminate(select) else {
                return 0;
            };
            // ORDER BY and LIMIT stay outside unless they need inner names.
            if !movable_order(&query.order_by, &taken) {
                if let Some(derived) = derived_query(&mut outer) {
                    derived.order_by = query.order_by.take();
                    derived.limit_clause = query.limit_clause.take();
                    derived.fetch = query.fetch.take();
                }
            }
            **select = outer;
            return 1;
        }

        let mut changed = 0;
        for select in selects_mut(&mut query.body) {
            if let Some((outer, _)) = eliminate(select) {
                *select = outer;
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SourceDialect;
    use crate::transforms::test_support::run_one;
    use pretty_assertions::assert_eq;

    fn eliminate(sql: &str) -> String {
        run_one(&EliminateQualify, sql, SourceDialect::Postgres)
    }

    #[test]
    fn test_window_moves_inside() {
        assert_eq!(
            eliminate(
                "SELECT t.a, b AS c FROM t QUALIFY ROW_NUMBER() OVER (PARTITION BY t.a ORDER BY b DESC) = 1"
            ),
            "SELECT a, c FROM (SELECT t.a, b AS c, ROW_NUMBER() OVER (PARTITION BY t.a ORDER BY b DESC) AS _w FROM t) AS _t WHERE _w = 1"
        );
    }

    #[test]
    fn test_condition_on_projected_name() {
        assert_eq!(
            eliminate("SELECT a, rn FROM t QUALIFY t.rn < 3 ORDER BY a LIMIT 5"),
            "SELECT a, rn FROM (SELECT a, rn FROM t) AS _t WHERE rn < 3 ORDER BY a LIMIT 5"
        );
    }

    #[test]
    fn test_order_on_hidden_column_stays_inside() {
        assert_eq!(
            eliminate("SELECT a FROM t QUALIFY a > 1 ORDER BY b LIMIT 5"),
            "SELECT a FROM (SELECT a FROM t ORDER BY b LIMIT 5) AS _t WHERE a > 1"
        );
    }

    #[test]
    fn test_unnamed_projection_left_alone() {
        let sql = "SELECT a + 1 FROM t QUALIFY a > 1";
        assert_eq!(eliminate(sql), sql);
    }
}
