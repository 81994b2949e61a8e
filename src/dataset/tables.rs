//! Legacy table names to their current equivalents.

use std::collections::HashMap;
use std::ops::ControlFlow;

use sqlparser::ast::{Ident, ObjectName, Statement, visit_relations_mut};

use super::Chain;
use crate::ast::{base_name, name_key, object_name, part_ident, part_ident_mut};
use crate::error::{TranslationError, TranslationResult};
use crate::guard::ParameterMap;

/// Spellbook tables that replaced legacy decoded and price tables.
const SPELLBOOK: &[(&str, &str)] = &[
    ("erc20.ERC20_evt_Transfer", "erc20_ethereum.evt_Transfer"),
    ("bep20.BEP20_evt_Transfer", "erc20_bnb.evt_Transfer"),
    ("erc721.ERC721_evt_Transfer", "erc721_ethereum.evt_Transfer"),
    ("bep20.tokens", "tokens.erc20"),
    ("erc20.tokens", "tokens.erc20"),
    ("erc721.tokens", "tokens.nft"),
    ("prices.layer1_usd_btc", "prices.usd"),
    ("prices.layer1_usd_eth", "prices.usd"),
];

/// Markers of decoded contract tables, which moved to per-chain schemas.
const DECODED_MARKERS: &[&str] = &["_evt_", "_call_"];

/// `schema.table` → `schema.table`, keyed case-insensitively.
#[derive(Debug, Clone)]
pub struct TableMapping {
    entries: HashMap<String, ObjectName>,
}

fn dotted(text: &str) -> Option<ObjectName> {
    let parts: Vec<&str> = text.split('.').map(str::trim).collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(object_name(parts.into_iter().map(Ident::new)))
}

impl TableMapping {
    /// The built-in spellbook mapping.
    pub fn builtin() -> Self {
        let entries = SPELLBOOK
            .iter()
            .filter_map(|(from, to)| Some((from.to_lowercase(), dotted(to)?)))
            .collect();
        Self { entries }
    }

    /// Built-in mapping with caller entries layered on top.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> TranslationResult<Self> {
        let mut mapping = Self::builtin();
        for (from, to) in overrides {
            let invalid = |t: &str| {
                TranslationError::Config(format!(
                    "table override '{}' must be written as schema.table",
                    t
                ))
            };
            if dotted(from).is_none() {
                return Err(invalid(from));
            }
            let target = dotted(to).ok_or_else(|| invalid(to))?;
            mapping.entries.insert(from.trim().to_lowercase(), target);
        }
        Ok(mapping)
    }

    pub fn get(&self, name: &ObjectName) -> Option<&ObjectName> {
        self.entries.get(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TableMapping {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Append `_<chain>` to the schema of a decoded table, unless already there.
fn chain_schema(name: &ObjectName, chain: Chain) -> Option<ObjectName> {
    let base = base_name(name)?.value.to_lowercase();
    let decoded = DECODED_MARKERS.iter().any(|m| base.contains(m));
    if !decoded || name.0.len() < 2 {
        return None;
    }
    let mut renamed = name.clone();
    let position = renamed.0.len() - 2;
    let schema = part_ident_mut(&mut renamed.0[position])?;
    let suffix = format!("_{}", chain);
    if schema.value.to_lowercase().ends_with(&suffix) {
        return None;
    }
    schema.value.push_str(&suffix);
    Some(renamed)
}

/// Rename every table reference in place. Aliases are kept.
pub fn rename_tables(statements: &mut [Statement], mapping: &TableMapping, chain: Chain, guards: &ParameterMap) -> usize {
    let mut renamed = 0;
    for statement in statements.iter_mut() {
        let _ = visit_relations_mut(statement, |name| {
            let guarded = name.0.iter().filter_map(part_ident).any(|p| guards.is_guard(&p.value));
            if guarded {
                return ControlFlow::<()>::Continue(());
            }
            if let Some(target) = mapping.get(name).cloned().or_else(|| chain_schema(name, chain)) {
                tracing::debug!(from = %name_key(name), to = %name_key(&target), "table renamed");
                *name = target;
                renamed += 1;
            }
            ControlFlow::Continue(())
        });
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SourceDialect, parse};
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;

    fn renamed(sql: &str, mapping: &TableMapping, chain: Chain) -> String {
        let guards = ParameterMap::extract(sql);
        let mut statements = parse(&guards.protect(sql), SourceDialect::Postgres).unwrap();
        rename_tables(&mut statements, mapping, chain, &guards);
        guards.restore(&Renderer::new(SourceDialect::Postgres, false).render(&mut statements))
    }

    #[test]
    fn test_spellbook_rename_keeps_alias() {
        assert_eq!(
            renamed(
                "SELECT * FROM erc20.tokens AS t JOIN prices.layer1_usd_eth AS p ON t.symbol = p.symbol",
                &TableMapping::builtin(),
                Chain::Ethereum
            ),
            "SELECT * FROM tokens.erc20 AS t JOIN prices.usd AS p ON t.symbol = p.symbol"
        );
        assert_eq!(
            renamed("SELECT * FROM ERC20.\"ERC20_evt_Transfer\"", &TableMapping::builtin(), Chain::Ethereum),
            "SELECT * FROM erc20_ethereum.evt_Transfer"
        );
    }

    #[test]
    fn test_decoded_tables_get_chain_schema() {
        assert_eq!(
            renamed(
                "SELECT * FROM uniswap_v3.Pair_evt_Swap, uniswap_v3_gnosis.Pair_call_mint",
                &TableMapping::builtin(),
                Chain::Gnosis
            ),
            "SELECT * FROM uniswap_v3_gnosis.Pair_evt_Swap, uniswap_v3_gnosis.Pair_call_mint"
        );
    }

    #[test]
    fn test_overrides_win() {
        let overrides = HashMap::from([("erc20.tokens".to_string(), "my.tokens".to_string())]);
        let mapping = TableMapping::with_overrides(&overrides).unwrap();
        assert_eq!(
            renamed("SELECT * FROM erc20.tokens", &mapping, Chain::Ethereum),
            "SELECT * FROM my.tokens"
        );
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let overrides = HashMap::from([("tokens".to_string(), "my.tokens".to_string())]);
        let err = TableMapping::with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, TranslationError::Config(_)));
    }

    #[test]
    fn test_guarded_table_untouched() {
        assert_eq!(
            renamed("SELECT * FROM {{table}}", &TableMapping::builtin(), Chain::Ethereum),
            "SELECT * FROM {{table}}"
        );
    }
}
