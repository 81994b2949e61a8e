//! # Harmonizer
//!
//! Migrates Dune dashboard queries written for the legacy PostgreSQL and
//! Spark SQL engines to DuneSQL.
//!
//! ## Quick Example
//!
//! ```
//! use harmonizer::prelude::*;
//!
//! let sql = translate(
//!     "SELECT * FROM erc20.tokens WHERE contract_address = '\\xdeadbeef'",
//!     &Translation::postgres().chain("ethereum").pretty(false),
//! )
//! .unwrap();
//! assert!(sql.ends_with(
//!     "SELECT * FROM tokens.erc20 WHERE blockchain = 'ethereum' AND contract_address = 0xdeadbeef"
//! ));
//! ```
//!
//! ## Pipeline
//!
//! | Step        | Module          | Does                                        |
//! |-------------|-----------------|---------------------------------------------|
//! | Guard       | [`guard`]       | Hides `{{ parameters }}` from the parser    |
//! | Parse       | [`dialect`]     | Source text to `sqlparser` statements       |
//! | Rewrite     | [`transforms`]  | Tree rewrites, by priority                  |
//! | Optimize    | [`optimizer`]   | Schema-driven qualification and casts       |
//! | Migrate     | [`dataset`]     | Table renames and chain filters (Postgres)  |
//! | Render      | [`render`]      | DuneSQL text                                |
//! | Finish      | [`postprocess`] | Parameter unwrapping, warnings, banner      |

use std::collections::HashMap;

pub mod ast;
pub mod config;
pub mod dataset;
pub mod dialect;
pub mod error;
pub mod guard;
pub mod optimizer;
pub mod postprocess;
pub mod render;
pub mod transforms;

use dataset::{Chain, TableMapping};
use dialect::SourceDialect;
use error::{TranslationError, TranslationResult};
use guard::ParameterMap;
use optimizer::Schema;
use render::Renderer;
use transforms::{PassContext, RewriteRegistry};

pub mod prelude {
    pub use crate::dataset::Chain;
    pub use crate::dialect::SourceDialect;
    pub use crate::error::{TranslationError, TranslationResult};
    pub use crate::optimizer::Schema;
    pub use crate::{Translation, migrate_postgres, migrate_spark, translate};
}

/// Options for one translation.
#[derive(Debug, Clone)]
pub struct Translation {
    pub source: SourceDialect,
    /// Dataset the Postgres query ran against.
    pub chain: Option<String>,
    /// Only translate syntax; leave table names and filters alone.
    pub syntax_only: bool,
    /// Extra `schema.table` renames, applied over the built-in ones.
    pub table_overrides: HashMap<String, String>,
    /// Column types enabling schema-aware casts.
    pub schema: Option<Schema>,
    pub pretty: bool,
}

impl Translation {
    pub fn new(source: SourceDialect) -> Self {
        Self {
            source,
            chain: None,
            syntax_only: false,
            table_overrides: HashMap::new(),
            schema: None,
            pretty: true,
        }
    }

    pub fn postgres() -> Self {
        Self::new(SourceDialect::Postgres)
    }

    pub fn spark() -> Self {
        Self::new(SourceDialect::Spark)
    }

    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn syntax_only(mut self, syntax_only: bool) -> Self {
        self.syntax_only = syntax_only;
        self
    }

    /// Rename `from` to `to`; both written `schema.table`.
    pub fn table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.table_overrides.insert(from.into(), to.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Reject contradictory options and resolve the chain.
    fn validate(&self) -> TranslationResult<Option<Chain>> {
        let invalid = |m: &str| Err(TranslationError::InvalidOptionCombination(m.to_string()));
        match self.source {
            SourceDialect::Spark if self.syntax_only => {
                return invalid("syntax_only only applies to Postgres queries");
            }
            SourceDialect::Spark if !self.table_overrides.is_empty() => {
                return invalid("table overrides only apply to Postgres queries");
            }
            SourceDialect::Postgres if self.syntax_only && !self.table_overrides.is_empty() => {
                return invalid("table overrides have no effect with syntax_only");
            }
            SourceDialect::Postgres if !self.syntax_only && self.chain.is_none() => {
                return invalid("a chain is required unless syntax_only is set");
            }
            _ => {}
        }
        if self.source == SourceDialect::Postgres && !self.syntax_only {
            self.chain.as_deref().map(Chain::resolve).transpose()
        } else {
            Ok(None)
        }
    }
}

/// Translate `query` to DuneSQL.
pub fn translate(query: &str, options: &Translation) -> TranslationResult<String> {
    let chain = options.validate()?;
    let mapping = match chain {
        Some(_) => Some(TableMapping::with_overrides(&options.table_overrides)?),
        None => None,
    };

    let guards = ParameterMap::extract(query);
    let protected = guards.protect(query);
    let restore = |e: TranslationError| e.map_message(|m| guards.restore(m));

    let mut statements = dialect::parse(&protected, options.source).map_err(restore)?;

    let ctx = PassContext::new(options.source, &guards).typed(options.schema.is_some());
    RewriteRegistry::new().run(&mut statements, &ctx);

    if let Some(schema) = &options.schema {
        optimizer::optimize(&mut statements, schema, &guards, options.source).map_err(restore)?;
    }
    if let (Some(chain), Some(mapping)) = (chain, &mapping) {
        dataset::migrate(&mut statements, chain, mapping, &guards);
    }

    let rendered = Renderer::new(options.source, options.pretty).render(&mut statements);
    let sql = guards.restore(&rendered);
    tracing::debug!(source = %options.source, parameters = guards.len(), "translated");
    Ok(postprocess::finish(&sql))
}

/// Translate a legacy PostgreSQL query run against `chain`.
pub fn migrate_postgres(query: &str, chain: &str) -> TranslationResult<String> {
    translate(query, &Translation::postgres().chain(chain))
}

/// Translate a Spark SQL query.
pub fn migrate_spark(query: &str) -> TranslationResult<String> {
    translate(query, &Translation::spark())
}
