//! Column renames and dead predicates left behind by legacy tables.

use std::ops::ControlFlow;

use sqlparser::ast::{BinaryOperator, Expr, SelectItem, Statement, visit_expressions_mut, visit_relations};

use super::for_each_query;
use crate::ast::{column, column_name_mut, name_key, same, selects_mut, string_literal, unnested};

/// One legacy table's cleanup.
#[derive(Debug, Clone, Copy)]
pub struct LegacyFixup {
    /// Table whose presence triggers the fixup; `None` always applies.
    pub table: Option<&'static str>,
    /// `(old, new)` column names.
    pub renames: &'static [(&'static str, &'static str)],
    /// `column = 'value'` conjuncts that no longer mean anything.
    pub dropped: &'static [(&'static str, &'static str)],
}

pub const LEGACY_FIXUPS: &[LegacyFixup] = &[
    LegacyFixup {
        table: Some("dex.trades"),
        renames: &[
            ("exchange_contract_address", "project_contract_address"),
            ("token_a_address", "token_sold_address"),
            ("token_b_address", "token_bought_address"),
        ],
        dropped: &[("category", "DEX")],
    },
    LegacyFixup {
        table: None,
        renames: &[("usd_amount", "amount_usd")],
        dropped: &[],
    },
];

impl LegacyFixup {
    fn applies(&self, statements: &[Statement]) -> bool {
        let Some(table) = self.table else {
            return true;
        };
        statements.iter().any(|statement| {
            visit_relations(statement, |name| {
                if name_key(name) == table {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .is_break()
        })
    }

    fn renamed(&self, name: &str) -> Option<&'static str> {
        self.renames
            .iter()
            .find(|(old, _)| old.eq_ignore_ascii_case(name))
            .map(|(_, new)| *new)
    }

    fn is_dropped(&self, expr: &Expr) -> bool {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = unnested(expr)
        else {
            return false;
        };
        let (name, value) = match (column(left), string_literal(right), column(right), string_literal(left)) {
            (Some((_, name)), Some(value), _, _) | (_, _, Some((_, name)), Some(value)) => (name, value),
            _ => return false,
        };
        self.dropped
            .iter()
            .any(|(c, v)| same(name, c) && value.eq_ignore_ascii_case(v))
    }

    /// `condition` with its dropped conjuncts removed; `None` when nothing
    /// is left.
    fn prune(&self, condition: Expr, edits: &mut usize) -> Option<Expr> {
        if self.is_dropped(&condition) {
            *edits += 1;
            return None;
        }
        match condition {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => match (self.prune(*left, edits), self.prune(*right, edits)) {
                (Some(left), Some(right)) => Some(Expr::BinaryOp {
                    left: Box::new(left),
                    op: BinaryOperator::And,
                    right: Box::new(right),
                }),
                (left, right) => left.or(right),
            },
            Expr::Nested(inner) if matches!(unnested(&inner), Expr::BinaryOp { op: BinaryOperator::And, .. }) => {
                self.prune(*inner, edits).map(|e| Expr::Nested(Box::new(e)))
            }
            other => Some(other),
        }
    }

    /// Apply to `statements`; returns the number of edits.
    pub fn apply(&self, statements: &mut [Statement]) -> usize {
        if !self.applies(statements) {
            return 0;
        }
        let mut edits = 0;
        for statement in statements.iter_mut() {
            let _ = visit_expressions_mut(statement, |expr| {
                if let Some(name) = column_name_mut(expr) {
                    if let Some(new) = self.renamed(&name.value) {
                        name.value = new.to_string();
                        edits += 1;
                    }
                }
                ControlFlow::<()>::Continue(())
            });
        }
        for_each_query(statements, |query| {
            for select in selects_mut(&mut query.body) {
                for item in select.projection.iter_mut() {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        if let Some(new) = self.renamed(&alias.value) {
                            alias.value = new.to_string();
                            edits += 1;
                        }
                    }
                }
                for clause in [&mut select.selection, &mut select.having] {
                    if let Some(condition) = clause.take() {
                        *clause = self.prune(condition, &mut edits);
                    }
                }
            }
        });
        edits
    }
}

/// Run every built-in fixup.
pub fn apply_legacy_fixups(statements: &mut [Statement]) -> usize {
    LEGACY_FIXUPS.iter().map(|f| f.apply(statements)).sum()
}
