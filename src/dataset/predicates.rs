//! `blockchain = '<chain>'` filters on multi-chain fact tables.
//!
//! Every SELECT is visited on its own: a designated table in its FROM or
//! JOIN list gets a predicate in that SELECT's WHERE, qualified by the
//! table's alias when it has one. Nested SELECTs get their own visit.
//!
//! A table is left alone only when the WHERE already pins it to the same
//! chain with a top-level `blockchain = '<chain>'` conjunct.

use sqlparser::ast::{BinaryOperator, Expr, Ident, Select, Statement, TableFactor};

use super::{Chain, for_each_query};
use crate::ast::{and, base_name, column, column_ref, name_key, same, selects_mut, string, string_literal, unnested};

/// Tables holding rows for every chain.
pub const DESIGNATED_TABLES: &[&str] = &[
    "nft.trades",
    "dex.trades",
    "tokens.erc20",
    "tokens.nft",
    "prices.usd",
];

const CHAIN_COLUMN: &str = "blockchain";

fn is_designated(key: &str) -> bool {
    DESIGNATED_TABLES
        .iter()
        .any(|t| key == *t || key.ends_with(&format!(".{}", t)))
}

/// A designated table read directly by a SELECT.
struct Reference {
    alias: Option<Ident>,
    base: Option<Ident>,
}

impl Reference {
    fn answers_to(&self, qualifier: &Ident) -> bool {
        match &self.alias {
            Some(alias) => same(qualifier, &alias.value),
            None => self.base.as_ref().is_some_and(|b| same(qualifier, &b.value)),
        }
    }
}

fn designated_references(select: &Select) -> Vec<Reference> {
    select
        .from
        .iter()
        .flat_map(|t| std::iter::once(&t.relation).chain(t.joins.iter().map(|j| &j.relation)))
        .filter_map(|relation| match relation {
            TableFactor::Table { name, alias, .. } if is_designated(&name_key(name)) => Some(Reference {
                alias: alias.as_ref().map(|a| a.name.clone()),
                base: base_name(name).cloned(),
            }),
            _ => None,
        })
        .collect()
}

/// Top-level AND operands of `condition`, parentheses removed.
fn conjuncts(condition: &Expr) -> Vec<&Expr> {
    match unnested(condition) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut out = conjuncts(left);
            out.extend(conjuncts(right));
            out
        }
        other => vec![other],
    }
}

/// Whether `conjunct` is `[q.]blockchain = '<chain>'` for `reference`.
fn pins_chain(conjunct: &Expr, reference: &Reference, chain: Chain) -> bool {
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = conjunct
    else {
        return false;
    };
    let (col, value) = match (column(unnested(left)), string_literal(unnested(right))) {
        (Some(col), Some(value)) => (col, value),
        _ => match (column(unnested(right)), string_literal(unnested(left))) {
            (Some(col), Some(value)) => (col, value),
            _ => return false,
        },
    };
    let (qualifier, name) = col;
    if !same(name, CHAIN_COLUMN) || !value.eq_ignore_ascii_case(chain.as_str()) {
        return false;
    }
    qualifier.last().is_none_or(|q| reference.answers_to(q))
}

fn inject(select: &mut Select, chain: Chain) -> bool {
    let references = designated_references(select);
    let existing = select.selection.as_ref().map(conjuncts).unwrap_or_default();
    let predicates: Vec<Expr> = references
        .iter()
        .filter(|r| !existing.iter().any(|c| pins_chain(c, r, chain)))
        .map(|r| Expr::BinaryOp {
            left: Box::new(column_ref(r.alias.as_ref(), CHAIN_COLUMN)),
            op: BinaryOperator::Eq,
            right: Box::new(string(chain.as_str())),
        })
        .collect();
    let Some(combined) = predicates.into_iter().reduce(and) else {
        return false;
    };
    select.selection = Some(match select.selection.take() {
        Some(selection) => and(combined, selection),
        None => combined,
    });
    true
}

/// Add the chain filter to every SELECT reading a designated table.
pub fn inject_chain_predicates(statements: &mut [Statement], chain: Chain) -> usize {
    let mut injected = 0;
    for_each_query(statements, |query| {
        for select in selects_mut(&mut query.body) {
            if inject(select, chain) {
                tracing::debug!(chain = %chain, "chain predicate added");
                injected += 1;
            }
        }
    });
    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SourceDialect, parse};
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;

    fn injected(sql: &str) -> String {
        let mut statements = parse(sql, SourceDialect::Postgres).unwrap();
        inject_chain_predicates(&mut statements, Chain::Ethereum);
        Renderer::new(SourceDialect::Postgres, false).render(&mut statements)
    }

    #[test]
    fn test_alias_and_existing_where() {
        assert_eq!(
            injected("SELECT * FROM dex.trades AS t WHERE t.amount_usd > 10"),
            "SELECT * FROM dex.trades AS t WHERE t.blockchain = 'ethereum' AND t.amount_usd > 10"
        );
        assert_eq!(
            injected("SELECT symbol FROM prices.usd GROUP BY 1"),
            "SELECT symbol FROM prices.usd WHERE blockchain = 'ethereum' GROUP BY 1"
        );
    }

    #[test]
    fn test_each_level_gets_its_own() {
        assert_eq!(
            injected("SELECT * FROM (SELECT * FROM tokens.erc20 AS e) AS x JOIN nft.trades AS n ON x.a = n.a"),
            "SELECT * FROM (SELECT * FROM tokens.erc20 AS e WHERE e.blockchain = 'ethereum') AS x \
             JOIN nft.trades AS n ON x.a = n.a WHERE n.blockchain = 'ethereum'"
        );
    }

    #[test]
    fn test_same_chain_filter_kept_as_is() {
        let sql = "SELECT * FROM dex.trades WHERE blockchain = 'ethereum'";
        assert_eq!(injected(sql), sql);
        let sql = "SELECT * FROM dex.trades AS t WHERE x > 1 AND ('Ethereum' = t.blockchain)";
        assert_eq!(injected(sql), sql);
        let sql = "SELECT * FROM ethereum.transactions";
        assert_eq!(injected(sql), sql);
    }

    #[test]
    fn test_other_mentions_of_the_column_still_filtered() {
        assert_eq!(
            injected("SELECT * FROM dex.trades WHERE blockchain IS NOT NULL"),
            "SELECT * FROM dex.trades WHERE blockchain = 'ethereum' AND blockchain IS NOT NULL"
        );
        assert_eq!(
            injected("SELECT * FROM dex.trades WHERE blockchain = 'bnb'"),
            "SELECT * FROM dex.trades WHERE blockchain = 'ethereum' AND blockchain = 'bnb'"
        );
        assert_eq!(
            injected("SELECT * FROM dex.trades WHERE blockchain = 'ethereum' OR x = 1"),
            "SELECT * FROM dex.trades WHERE blockchain = 'ethereum' AND (blockchain = 'ethereum' OR x = 1)"
        );
    }

    #[test]
    fn test_filter_on_another_alias_does_not_count() {
        assert_eq!(
            injected("SELECT * FROM dex.trades AS a JOIN dex.trades AS b ON a.tx = b.tx WHERE a.blockchain = 'ethereum'"),
            "SELECT * FROM dex.trades AS a JOIN dex.trades AS b ON a.tx = b.tx WHERE b.blockchain = 'ethereum' AND a.blockchain = 'ethereum'"
        );
    }
}
