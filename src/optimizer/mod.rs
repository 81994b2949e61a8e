//! Schema-aware type coercion.
//!
//! Runs after the rewrite pipeline when the caller supplies a [`Schema`]:
//! columns are qualified against their owning tables, expression types are
//! inferred bottom-up, and comparisons between different types get an
//! explicit cast on the narrower side.

mod annotate;
mod coerce;
mod qualify;
mod schema;
mod types;

pub use annotate::{ColumnTypes, infer};
pub use coerce::coerce;
pub use qualify::qualify;
pub use schema::{Schema, did_you_mean};
pub use types::{TypeKind, widens_to};

use sqlparser::ast::Statement;

use crate::dialect::SourceDialect;
use crate::error::TranslationResult;
use crate::guard::ParameterMap;

/// Qualify, annotate and coerce `statements` in place.
pub fn optimize(
    statements: &mut [Statement],
    schema: &Schema,
    guards: &ParameterMap,
    source: SourceDialect,
) -> TranslationResult<()> {
    let coerced = qualify(statements, schema, guards, source)?;
    tracing::debug!(tables = schema.table_names().len(), coerced, "optimized");
    Ok(())
}
