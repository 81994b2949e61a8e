//! Helpers over the `sqlparser` tree.
//!
//! New nodes are written as DuneSQL fragments and parsed, with `__0`, `__1`,
//! ... standing in for subtrees that already exist. The fragments go through
//! `GenericDialect`, the same parser that reads DuneSQL back.

use std::ops::ControlFlow;

use sqlparser::ast::{
    BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident,
    ObjectName, ObjectNamePart, Query, Select, SetExpr, Statement, Value, VisitMut,
    visit_expressions_mut,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Prefix of a template hole: `__0` is the first argument.
const HOLE: &str = "__";

#[allow(unreachable_patterns)]
pub fn part_ident(part: &ObjectNamePart) -> Option<&Ident> {
    match part {
        ObjectNamePart::Identifier(ident) => Some(ident),
        _ => None,
    }
}

#[allow(unreachable_patterns)]
pub fn part_ident_mut(part: &mut ObjectNamePart) -> Option<&mut Ident> {
    match part {
        ObjectNamePart::Identifier(ident) => Some(ident),
        _ => None,
    }
}

pub fn object_name(parts: impl IntoIterator<Item = Ident>) -> ObjectName {
    ObjectName(parts.into_iter().map(ObjectNamePart::Identifier).collect())
}

/// Lower-cased dotted form, used as a lookup key: `erc20.erc20_evt_transfer`.
pub fn name_key(name: &ObjectName) -> String {
    name.0
        .iter()
        .filter_map(part_ident)
        .map(|i| i.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Last part of a dotted name.
pub fn base_name(name: &ObjectName) -> Option<&Ident> {
    name.0.last().and_then(part_ident)
}

/// Case-insensitive identifier comparison.
pub fn same(ident: &Ident, name: &str) -> bool {
    ident.value.eq_ignore_ascii_case(name)
}

/// Qualifier parts and name of a column reference.
pub fn column(expr: &Expr) -> Option<(&[Ident], &Ident)> {
    match expr {
        Expr::Identifier(name) => Some((&[][..], name)),
        Expr::CompoundIdentifier(parts) => parts.split_last().map(|(name, qualifier)| (qualifier, name)),
        _ => None,
    }
}

pub fn column_name_mut(expr: &mut Expr) -> Option<&mut Ident> {
    match expr {
        Expr::Identifier(name) => Some(name),
        Expr::CompoundIdentifier(parts) => parts.last_mut(),
        _ => None,
    }
}

/// `qualifier.name`, or a bare `name`.
pub fn column_ref(qualifier: Option<&Ident>, name: &str) -> Expr {
    match qualifier {
        Some(q) => Expr::CompoundIdentifier(vec![q.clone(), Ident::new(name)]),
        None => Expr::Identifier(Ident::new(name)),
    }
}

pub fn string(text: &str) -> Expr {
    Expr::Value(Value::SingleQuotedString(text.to_string()).into())
}

pub fn string_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Value(v) => match &v.value {
            Value::SingleQuotedString(s) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Binary literal from lower-case hex digits.
pub fn hex(digits: &str) -> Expr {
    Expr::Value(Value::HexStringLiteral(digits.to_string()).into())
}

pub fn is_hex(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(v) if matches!(v.value, Value::HexStringLiteral(_)))
}

/// The expression inside any number of parentheses.
pub fn unnested(mut expr: &Expr) -> &Expr {
    while let Expr::Nested(inner) = expr {
        expr = inner;
    }
    expr
}

pub fn is_comparison(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
    )
}

/// `left AND right`, parenthesising OR operands.
pub fn and(left: Expr, right: Expr) -> Expr {
    let operand = |e: Expr| match e {
        Expr::BinaryOp {
            op: BinaryOperator::Or,
            ..
        } => Expr::Nested(Box::new(e)),
        e => e,
    };
    Expr::BinaryOp {
        left: Box::new(operand(left)),
        op: BinaryOperator::And,
        right: Box::new(operand(right)),
    }
}

pub fn function_name(f: &Function) -> Option<&str> {
    base_name(&f.name).map(|i| i.value.as_str())
}

pub fn is_call(f: &Function, name: &str) -> bool {
    function_name(f).is_some_and(|n| n.eq_ignore_ascii_case(name))
}

/// Positional arguments of an ordinary call: no window, filter, `DISTINCT`
/// or trailing clauses. `None` for anything else, including a name written
/// without parentheses.
pub fn plain_args(f: &Function) -> Option<Vec<&Expr>> {
    if f.over.is_some() || f.filter.is_some() {
        return None;
    }
    let FunctionArguments::List(list) = &f.args else {
        return None;
    };
    if list.duplicate_treatment.is_some() || !list.clauses.is_empty() {
        return None;
    }
    list.args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
            _ => None,
        })
        .collect()
}

/// Move `expr` out, leaving `NULL` behind.
pub fn take(expr: &mut Expr) -> Expr {
    std::mem::replace(expr, Expr::Value(Value::Null.into()))
}

/// Replace the holes under `node` with `args`, in order.
pub fn fill_holes<T: VisitMut>(node: &mut T, args: Vec<Expr>) {
    let mut args: Vec<Option<Expr>> = args.into_iter().map(Some).collect();
    let _ = visit_expressions_mut(node, |expr| {
        let hole = match expr {
            Expr::Identifier(ident) if ident.quote_style.is_none() => ident
                .value
                .strip_prefix(HOLE)
                .and_then(|n| n.parse::<usize>().ok()),
            _ => None,
        };
        if let Some(arg) = hole.and_then(|i| args.get_mut(i)).and_then(Option::take) {
            *expr = arg;
        }
        ControlFlow::<()>::Continue(())
    });
}

/// Parse an expression template and fill its holes.
pub fn expr_template(sql: &str, args: Vec<Expr>) -> Option<Expr> {
    let parsed = Parser::new(&GenericDialect {})
        .try_with_sql(sql)
        .and_then(|mut parser| parser.parse_expr());
    match parsed {
        Ok(mut expr) => {
            fill_holes(&mut expr, args);
            Some(expr)
        }
        Err(e) => {
            tracing::warn!(template = %sql, error = %e, "rewrite template did not parse");
            None
        }
    }
}

/// Parse a query template and fill its holes.
pub fn query_template(sql: &str, args: Vec<Expr>) -> Option<Query> {
    let mut statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            tracing::warn!(template = %sql, error = %e, "rewrite template did not parse");
            return None;
        }
    };
    let Some(Statement::Query(query)) = statements.pop() else {
        return None;
    };
    let mut query = *query;
    fill_holes(&mut query, args);
    Some(query)
}

/// The single SELECT of a query template.
pub fn select_template(sql: &str, args: Vec<Expr>) -> Option<Select> {
    match *query_template(sql, args)?.body {
        SetExpr::Select(select) => Some(*select),
        _ => None,
    }
}

/// Put `expr` into the `__0` hole of `template`. Leaves `expr` alone and
/// returns false when the template does not parse.
pub fn wrap(expr: &mut Expr, template: &str) -> bool {
    let Some(mut outer) = expr_template(template, Vec::new()) else {
        return false;
    };
    fill_holes(&mut outer, vec![take(expr)]);
    *expr = outer;
    true
}

/// `CAST(expr AS type_name)`.
pub fn cast(expr: &mut Expr, type_name: &str) -> bool {
    wrap(expr, &format!("CAST({}0 AS {})", HOLE, type_name))
}

/// SELECTs of a query body at this level, left to right through set
/// operations. Parenthesised and nested queries are not entered.
pub fn selects_mut(body: &mut SetExpr) -> Vec<&mut Select> {
    match body {
        SetExpr::Select(select) => vec![select.as_mut()],
        SetExpr::SetOperation { left, right, .. } => {
            let mut out = selects_mut(left);
            out.extend(selects_mut(right));
            out
        }
        _ => Vec::new(),
    }
}
