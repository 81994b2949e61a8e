//! Dataset migration for queries written against the legacy Postgres
//! datasets: table renames, chain filters on shared fact tables and legacy
//! column fixups.

mod chain;
mod fixups;
mod predicates;
mod tables;

pub use chain::Chain;
pub use fixups::{LEGACY_FIXUPS, LegacyFixup, apply_legacy_fixups};
pub use predicates::{DESIGNATED_TABLES, inject_chain_predicates};
pub use tables::{TableMapping, rename_tables};

use std::ops::ControlFlow;

use sqlparser::ast::{Query, Statement, VisitMut, VisitorMut};

use crate::guard::ParameterMap;

struct QueryWalk<F>(F);

impl<F: FnMut(&mut Query)> VisitorMut for QueryWalk<F> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<()> {
        (self.0)(query);
        ControlFlow::Continue(())
    }
}

/// Call `f` on every query of `statements`, outer queries before the ones
/// nested in them.
pub(crate) fn for_each_query(statements: &mut [Statement], f: impl FnMut(&mut Query)) {
    let mut walk = QueryWalk(f);
    for statement in statements.iter_mut() {
        let _ = statement.visit(&mut walk);
    }
}

/// Rewrite table references for `chain`.
pub fn migrate(statements: &mut [Statement], chain: Chain, mapping: &TableMapping, guards: &ParameterMap) {
    let renamed = rename_tables(statements, mapping, chain, guards);
    let fixed = apply_legacy_fixups(statements);
    let filtered = inject_chain_predicates(statements, chain);
    tracing::debug!(%chain, renamed, fixed, filtered, "dataset migrated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SourceDialect, parse};
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_migrate_renamed_table_gets_filter() {
        let sql = "SELECT symbol, usd_amount FROM erc20.tokens WHERE symbol = 'WETH'";
        let mut statements = parse(sql, SourceDialect::Postgres).unwrap();
        migrate(&mut statements, Chain::Bnb, &TableMapping::builtin(), &ParameterMap::default());
        assert_eq!(
            Renderer::new(SourceDialect::Postgres, false).render(&mut statements),
            "SELECT symbol, amount_usd FROM tokens.erc20 WHERE blockchain = 'bnb' AND symbol = 'WETH'"
        );
    }

    #[test]
    fn test_queries_visited_outside_in() {
        let sql = "WITH c AS (SELECT 1) SELECT * FROM (SELECT 2) AS s WHERE EXISTS (SELECT 3)";
        let mut statements = parse(sql, SourceDialect::Postgres).unwrap();
        let mut seen = Vec::new();
        for_each_query(&mut statements, |query| seen.push(query.to_string()));
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], sql);
        assert_eq!(seen[1], "SELECT 1");
    }
}
