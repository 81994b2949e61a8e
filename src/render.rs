//! DuneSQL text from a translated tree.
//!
//! `sqlparser` prints the tree; a last lowering walk first settles what its
//! printer cannot know about DuneSQL: `0x` binary literals, `CAST` instead of
//! `::`, Trino type names, upper-case builtins and NULLS clauses only where
//! the source engine sorted differently.

use std::ops::ControlFlow;

use sqlparser::ast::{
    CastKind, Expr, OrderBy, OrderByExpr, OrderByKind, Query, Statement, Value, VisitMut, VisitorMut,
    WindowType,
};

use crate::ast::part_ident_mut;
use crate::dialect::{self, NullOrdering, SourceDialect, TARGET_NULL_ORDERING};

/// Functions printed in upper case when written without quotes.
const BUILTINS: &[&str] = &[
    "abs", "approx_distinct", "approx_percentile", "array", "array_agg", "array_contains",
    "array_distinct", "array_join", "avg", "bool_and", "bool_or", "cardinality", "ceil", "ceiling",
    "coalesce", "concat", "contains", "count", "cume_dist", "current_date", "current_time",
    "current_timestamp", "date", "date_add", "date_diff", "date_format", "date_parse", "date_trunc",
    "day", "dense_rank", "element_at", "exp", "explode", "filter", "first_value", "floor", "format",
    "from_hex", "from_unixtime", "greatest", "hour", "if", "json_extract", "json_extract_scalar",
    "lag", "last_value", "lead", "least", "length", "ln", "localtime", "localtimestamp", "log",
    "log10", "lower", "lpad", "ltrim", "map", "max", "max_by", "min", "min_by", "minute", "mod",
    "month", "now", "nth_value", "ntile", "nullif", "percent_rank", "posexplode", "position", "pow",
    "power", "quarter", "rank", "regexp_extract", "regexp_like", "regexp_replace", "replace",
    "reverse", "round", "row_number", "rpad", "rtrim", "second", "sequence", "sign", "split",
    "split_part", "sqrt", "stddev", "strpos", "substr", "substring", "sum", "to_hex", "to_unixtime",
    "trim", "try", "unhex", "upper", "variance", "week", "year",
];

fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Prints statements as DuneSQL.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    /// Where NULLs sorted in the engine the tree was read from.
    nulls: NullOrdering,
    pretty: bool,
}

impl Renderer {
    pub fn new(source: SourceDialect, pretty: bool) -> Self {
        Self {
            nulls: source.null_ordering(),
            pretty,
        }
    }

    /// For trees read from DuneSQL text.
    pub fn dunesql(pretty: bool) -> Self {
        Self {
            nulls: TARGET_NULL_ORDERING,
            pretty,
        }
    }

    /// Lower `statements` in place and print them, `;` separated.
    pub fn render(&self, statements: &mut [Statement]) -> String {
        let mut lowering = Lowering { nulls: self.nulls };
        for statement in statements.iter_mut() {
            let _ = statement.visit(&mut lowering);
        }
        statements
            .iter()
            .map(|s| if self.pretty { format!("{:#}", s) } else { s.to_string() })
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

struct Lowering {
    nulls: NullOrdering,
}

impl Lowering {
    fn order(&self, item: &mut OrderByExpr) {
        let desc = item.options.asc == Some(false);
        let first = item
            .options
            .nulls_first
            .unwrap_or_else(|| self.nulls.nulls_first(desc));
        item.options.nulls_first = (first != TARGET_NULL_ORDERING.nulls_first(desc)).then_some(first);
    }
}

impl VisitorMut for Lowering {
    type Break = ();

    fn post_visit_query(&mut self, query: &mut Query) -> ControlFlow<()> {
        if let Some(OrderBy {
            kind: OrderByKind::Expressions(items),
            ..
        }) = &mut query.order_by
        {
            for item in items {
                self.order(item);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        let hex = match expr {
            Expr::Value(v) => match &v.value {
                Value::HexStringLiteral(digits) => Some(dialect::hex_literal(digits)),
                _ => None,
            },
            _ => None,
        };
        if let Some(hex) = hex {
            *expr = hex;
            return ControlFlow::Continue(());
        }

        match expr {
            Expr::Function(f) => {
                let single = f.name.0.len() == 1;
                if let Some(ident) = f.name.0.last_mut().and_then(part_ident_mut) {
                    if single && ident.quote_style.is_none() && is_builtin(&ident.value) {
                        ident.value = ident.value.to_uppercase();
                    }
                }
                if let Some(WindowType::WindowSpec(spec)) = &mut f.over {
                    for item in &mut spec.order_by {
                        self.order(item);
                    }
                }
            }
            Expr::Cast { kind, data_type, .. } => {
                if matches!(kind, CastKind::DoubleColon) {
                    *kind = CastKind::Cast;
                }
                if let Some(spelled) = dialect::target_type(data_type) {
                    *data_type = spelled;
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}
