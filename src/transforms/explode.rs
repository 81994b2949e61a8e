//! `explode` / `posexplode` in a projection become a `CROSS JOIN UNNEST`.
//!
//! ```text
//! SELECT posexplode(xs) FROM t
//! SELECT pos, col FROM t CROSS JOIN UNNEST(xs) WITH ORDINALITY AS array_column(col, pos)
//! ```

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{Expr, Ident, Query, Select, SelectItem};

use super::{PassContext, Rewrite};
use crate::ast::{column, is_call, plain_args, select_template, selects_mut};
use crate::dialect::ALIAS_LIST_SEPARATOR;

const TABLE_ALIAS: &str = "array_column";
const VALUE_COLUMN: &str = "col";
const POSITION_COLUMN: &str = "pos";

static PLAIN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

pub struct ExplodeToUnnest;

/// One generator found in a projection.
struct Generator {
    arg: Expr,
    positional: bool,
    /// Names from `AS x` or `AS (p, v)`.
    names: Vec<String>,
}

fn generator(item: &SelectItem) -> Option<Generator> {
    let (call, names) = match item {
        SelectItem::UnnamedExpr(expr) => (expr, Vec::new()),
        SelectItem::ExprWithAlias { expr, alias } => (
            expr,
            alias
                .value
                .split(ALIAS_LIST_SEPARATOR)
                .map(|n| n.trim().to_string())
                .collect(),
        ),
        _ => return None,
    };
    let Expr::Function(f) = call else {
        return None;
    };
    let positional = if is_call(f, "posexplode") {
        true
    } else if is_call(f, "explode") {
        false
    } else {
        return None;
    };
    let arg = match plain_args(f)?.as_slice() {
        [arg] => (*arg).clone(),
        _ => return None,
    };
    Some(Generator {
        arg,
        positional,
        names,
    })
}

/// Output names of the projection items that stay.
fn projected_names(select: &Select) -> Vec<String> {
    select
        .projection
        .iter()
        .filter(|item| generator(item).is_none())
        .filter_map(|item| match item {
            SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.clone()),
            SelectItem::UnnamedExpr(expr) => column(expr).map(|(_, name)| name.value.clone()),
            _ => None,
        })
        .collect()
}

/// `base`, or `base_2`, `base_3`, ... whichever is free. Claims the result.
fn claim(taken: &mut Vec<String>, base: &str) -> String {
    let free = |name: &str, taken: &[String]| !taken.iter().any(|t| t.eq_ignore_ascii_case(name));
    let mut name = base.to_string();
    let mut n = 2;
    while !free(&name, taken) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    taken.push(name.clone());
    name
}

/// Identifier for a generated name, quoted only when it has to be.
fn ident(name: &str) -> Ident {
    if PLAIN_NAME.is_match(name) {
        Ident::new(name)
    } else {
        Ident::with_quote('"', name)
    }
}

/// Add `UNNEST(arg)` to the FROM clause of `select`: cross joined onto the
/// last relation, or as the only relation when there is none.
fn add_unnest(select: &mut Select, arg: Expr, ordinality: bool, alias: &str, columns: &[String]) -> bool {
    let columns = columns
        .iter()
        .map(|c| ident(c).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let relation = format!(
        "UNNEST(__0){} AS {}({})",
        if ordinality { " WITH ORDINALITY" } else { "" },
        ident(alias),
        columns
    );
    match select.from.last_mut() {
        Some(last) => {
            let join = select_template(&format!("SELECT * FROM __t CROSS JOIN {}", relation), vec![arg])
                .and_then(|mut s| s.from.pop())
                .and_then(|mut t| t.joins.pop());
            match join {
                Some(join) => {
                    last.joins.push(join);
                    true
                }
                None => false,
            }
        }
        None => match select_template(&format!("SELECT * FROM {}", relation), vec![arg]).and_then(|mut s| s.from.pop()) {
            Some(table) => {
                select.from.push(table);
                true
            }
            None => false,
        },
    }
}

fn expand(select: &mut Select) -> usize {
    if !select.projection.iter().any(|item| generator(item).is_some()) {
        return 0;
    }
    let mut taken = projected_names(select);
    let mut aliases = Vec::new();
    let mut expanded = 0;

    let items = std::mem::take(&mut select.projection);
    let mut projection = Vec::with_capacity(items.len() + 1);
    for item in items {
        let Some(g) = generator(&item) else {
            projection.push(item);
            continue;
        };
        let (value_name, position_name) = match (g.positional, g.names.as_slice()) {
            (true, [p, v]) => (v.clone(), Some(p.clone())),
            (true, [v]) => (v.clone(), Some(POSITION_COLUMN.to_string())),
            (true, _) => (VALUE_COLUMN.to_string(), Some(POSITION_COLUMN.to_string())),
            (false, [v, ..]) => (v.clone(), None),
            (false, []) => (VALUE_COLUMN.to_string(), None),
        };
        let position = position_name.map(|p| claim(&mut taken, &p));
        let value = claim(&mut taken, &value_name);
        let alias = claim(&mut aliases, TABLE_ALIAS);

        let mut columns = vec![value.clone()];
        columns.extend(position.clone());
        if !add_unnest(select, g.arg, g.positional, &alias, &columns) {
            projection.push(item);
            continue;
        }
        if let Some(position) = &position {
            projection.push(SelectItem::UnnamedExpr(Expr::Identifier(ident(position))));
        }
        projection.push(SelectItem::UnnamedExpr(Expr::Identifier(ident(&value))));
        expanded += 1;
        tracing::debug!(value = %value, position = ?position, "expanded generator into UNNEST");
    }
    select.projection = projection;
    expanded
}

impl Rewrite for ExplodeToUnnest {
    fn id(&self) -> &'static str {
        "explode_to_unnest"
    }

    fn priority(&self) -> u32 {
        400
    }

    fn rewrite_query(&self, query: &mut Query, _ctx: &PassContext<'_>) -> usize {
        selects_mut(&mut query.body).into_iter().map(expand).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SourceDialect;
    use crate::transforms::test_support::run_one;
    use pretty_assertions::assert_eq;

    fn explode(sql: &str) -> String {
        run_one(&ExplodeToUnnest, sql, SourceDialect::Spark)
    }

    #[test]
    fn test_explode_name_collision() {
        assert_eq!(
            explode("SELECT col, explode(sequence(2, 3)) FROM array_column"),
            "SELECT col, col_2 FROM array_column CROSS JOIN UNNEST(SEQUENCE(2, 3)) AS array_column(col_2)"
        );
    }

    #[test]
    fn test_posexplode_order() {
        assert_eq!(
            explode("SELECT posexplode(sequence(2, 3)) FROM t"),
            "SELECT pos, col FROM t CROSS JOIN UNNEST(SEQUENCE(2, 3)) WITH ORDINALITY AS array_column(col, pos)"
        );
    }

    #[test]
    fn test_explode_without_from() {
        assert_eq!(
            explode("SELECT explode(array(1, 2)) AS n"),
            "SELECT n FROM UNNEST(ARRAY(1, 2)) AS array_column(n)"
        );
    }

    #[test]
    fn test_posexplode_alias_list() {
        assert_eq!(
            explode("SELECT id, posexplode(xs) AS (i, x) FROM t"),
            "SELECT id, i, x FROM t CROSS JOIN UNNEST(xs) WITH ORDINALITY AS array_column(x, i)"
        );
    }

    #[test]
    fn test_two_generators() {
        assert_eq!(
            explode("SELECT explode(a), explode(b) FROM t"),
            "SELECT col, col_2 FROM t CROSS JOIN UNNEST(a) AS array_column(col) CROSS JOIN UNNEST(b) AS array_column_2(col_2)"
        );
    }

    #[test]
    fn test_nested_select_expanded_on_its_own() {
        assert_eq!(
            explode("SELECT * FROM (SELECT explode(xs) FROM t) AS s"),
            "SELECT * FROM (SELECT col FROM t CROSS JOIN UNNEST(xs) AS array_column(col)) AS s"
        );
    }

    #[test]
    fn test_claim_is_case_insensitive() {
        let mut taken = vec!["COL".to_string()];
        assert_eq!(claim(&mut taken, "col"), "col_2");
        assert_eq!(claim(&mut taken, "col"), "col_3");
    }
}
