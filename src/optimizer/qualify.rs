//! Column qualification.
//!
//! Every SELECT opens a scope whose sources are its FROM and JOIN relations:
//! schema tables, CTEs, derived tables and UNNEST aliases. Unqualified columns
//! are resolved against the innermost scope first, then outward for
//! correlated references, and rewritten as `source.column`.
//!
//! A source whose columns are not known (a table missing from the schema, an
//! UNNEST without a column list) can still own a column. When exactly one such
//! source is in the innermost scope the column is attributed to it; with more
//! than one the column is left as written. Unknown-column errors are raised
//! only when every source is known.
//!
//! Once a SELECT is qualified its comparisons are coerced, with column types
//! looked up through the same scopes.

use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, GroupByExpr, Ident, ObjectName, OrderBy, OrderByKind, Query, Select, SelectItem, SetExpr,
    Statement, TableAlias, TableFactor, VisitMut, VisitorMut,
};

use super::annotate::{ColumnTypes, infer};
use super::coerce::coerce;
use super::schema::{Schema, did_you_mean};
use super::types::TypeKind;
use crate::ast::{base_name, column, name_key, part_ident, same, take};
use crate::dialect::SourceDialect;
use crate::error::{TranslationError, TranslationResult};
use crate::guard::ParameterMap;

/// Output columns of a relation, `None` when they cannot be listed.
type Columns = Option<Vec<(String, Option<TypeKind>)>>;

struct Source {
    /// Name the relation is referenced by; `None` for unaliased derived tables.
    name: Option<Ident>,
    columns: Columns,
}

impl Source {
    fn column(&self, name: &str) -> Option<&(String, Option<TypeKind>)> {
        self.columns
            .as_ref()?
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(name))
    }

    fn is_open(&self) -> bool {
        self.columns.is_none()
    }

    fn is_named(&self, qualifier: &str) -> bool {
        self.name.as_ref().is_some_and(|n| same(n, qualifier))
    }
}

#[derive(Default)]
struct Scope {
    sources: Vec<Source>,
}

struct Qualifier<'a> {
    schema: &'a Schema,
    guards: &'a ParameterMap,
    source: SourceDialect,
    scopes: Vec<Scope>,
    /// Visible CTEs, innermost last, keyed by lower-cased name.
    ctes: Vec<(String, Columns)>,
    coerced: usize,
}

/// Qualify every column of the query statements and coerce their
/// comparisons. Returns the number of comparisons coerced.
pub fn qualify(
    statements: &mut [Statement],
    schema: &Schema,
    guards: &ParameterMap,
    source: SourceDialect,
) -> TranslationResult<usize> {
    let mut qualifier = Qualifier {
        schema,
        guards,
        source,
        scopes: Vec::new(),
        ctes: Vec::new(),
        coerced: 0,
    };
    for statement in statements.iter_mut() {
        if let Statement::Query(query) = statement {
            qualifier.query(query)?;
        }
    }
    Ok(qualifier.coerced)
}

fn alias_names(alias: &Option<TableAlias>) -> Vec<Ident> {
    alias
        .as_ref()
        .map(|a| a.columns.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

fn rename(columns: Columns, names: &[Ident]) -> Columns {
    if names.is_empty() {
        return columns;
    }
    let types: Vec<Option<TypeKind>> = match &columns {
        Some(cols) => cols.iter().map(|(_, t)| *t).collect(),
        None => Vec::new(),
    };
    Some(
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.value.clone(), types.get(i).copied().flatten()))
            .collect(),
    )
}

/// `t` for a `t.*` projection item.
fn wildcard_qualifier(item: &SelectItem) -> String {
    let text = item.to_string();
    let qualifier = text.split(".*").next().unwrap_or_default();
    qualifier
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

impl Qualifier<'_> {
    fn query(&mut self, query: &mut Query) -> TranslationResult<Columns> {
        let mark = self.ctes.len();
        if let Some(with) = query.with.as_mut() {
            for cte in with.cte_tables.iter_mut() {
                let columns = self.query(&mut cte.query)?;
                let names: Vec<Ident> = cte.alias.columns.iter().map(|c| c.name.clone()).collect();
                self.ctes
                    .push((cte.alias.name.value.to_lowercase(), rename(columns, &names)));
            }
        }
        let out = match query.body.as_mut() {
            SetExpr::Select(select) => self.select(select, query.order_by.as_mut()),
            body => self.set_expr(body),
        };
        self.ctes.truncate(mark);
        out
    }

    fn set_expr(&mut self, body: &mut SetExpr) -> TranslationResult<Columns> {
        match body {
            SetExpr::Select(select) => self.select(select, None),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                let out = self.set_expr(left)?;
                self.set_expr(right)?;
                Ok(out)
            }
            _ => Ok(None),
        }
    }

    fn cte(&self, name: &ObjectName) -> Option<Columns> {
        if name.0.len() != 1 {
            return None;
        }
        let key = name_key(name);
        self.ctes
            .iter()
            .rev()
            .find(|(n, _)| *n == key)
            .map(|(_, c)| c.clone())
    }

    fn source(&mut self, relation: &mut TableFactor) -> TranslationResult<Source> {
        let source = match relation {
            TableFactor::Table { name, alias, .. } => {
                let label = alias
                    .as_ref()
                    .map(|a| a.name.clone())
                    .or_else(|| base_name(name).cloned());
                let guarded = name
                    .0
                    .iter()
                    .filter_map(part_ident)
                    .any(|p| self.guards.is_guard(&p.value));
                let columns = match self.cte(name) {
                    Some(columns) => columns,
                    None if guarded => None,
                    None => self
                        .schema
                        .columns(name)
                        .map(|cols| cols.iter().map(|(n, t)| (n.clone(), Some(*t))).collect()),
                };
                Source {
                    name: label,
                    columns: rename(columns, &alias_names(alias)),
                }
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let columns = self.query(subquery)?;
                Source {
                    name: alias.as_ref().map(|a| a.name.clone()),
                    columns: rename(columns, &alias_names(alias)),
                }
            }
            TableFactor::UNNEST { alias, .. } => Source {
                name: alias.as_ref().map(|a| a.name.clone()),
                columns: rename(None, &alias_names(alias)),
            },
            _ => Source {
                name: None,
                columns: None,
            },
        };
        Ok(source)
    }

    fn select(&mut self, select: &mut Select, order_by: Option<&mut OrderBy>) -> TranslationResult<Columns> {
        let mut scope = Scope::default();
        for table in select.from.iter_mut() {
            scope.sources.push(self.source(&mut table.relation)?);
            for join in table.joins.iter_mut() {
                scope.sources.push(self.source(&mut join.relation)?);
            }
        }

        self.scopes.push(scope);
        let result = self.select_body(select, order_by);
        self.scopes.pop();
        result
    }

    fn select_body(&mut self, select: &mut Select, order_by: Option<&mut OrderBy>) -> TranslationResult<Columns> {
        for table in select.from.iter_mut() {
            self.relation_exprs(&mut table.relation)?;
            for join in table.joins.iter_mut() {
                self.relation_exprs(&mut join.relation)?;
                self.resolve(&mut join.join_operator)?;
            }
        }
        for item in select.projection.iter_mut() {
            if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                self.resolve(expr)?;
            }
        }
        for clause in [&mut select.selection, &mut select.having, &mut select.qualify]
            .into_iter()
            .flatten()
        {
            self.resolve(clause)?;
        }

        let aliases: Vec<String> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.clone()),
                _ => None,
            })
            .collect();
        if let GroupByExpr::Expressions(exprs, _) = &mut select.group_by {
            for expr in exprs.iter_mut() {
                self.resolve_or_alias(expr, &aliases)?;
            }
        }
        if let Some(OrderBy {
            kind: OrderByKind::Expressions(items),
            ..
        }) = order_by
        {
            for item in items.iter_mut() {
                self.resolve_or_alias(&mut item.expr, &aliases)?;
            }
        }

        name_projection(select);
        let coerced = coerce(select, &*self, self.source);
        self.coerced += coerced;
        Ok(self.outputs(select))
    }

    fn relation_exprs(&mut self, relation: &mut TableFactor) -> TranslationResult<()> {
        if let TableFactor::UNNEST { array_exprs, .. } = relation {
            for expr in array_exprs.iter_mut() {
                self.resolve(expr)?;
            }
        }
        Ok(())
    }

    fn outputs(&self, select: &Select) -> Columns {
        let scope = self.scopes.last()?;
        let mut out = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::ExprWithAlias { expr, alias } => {
                    out.push((alias.value.clone(), infer(expr, self)));
                }
                SelectItem::UnnamedExpr(expr) => {
                    let name = column(expr).map(|(_, n)| n.value.clone()).unwrap_or_default();
                    out.push((name, infer(expr, self)));
                }
                SelectItem::Wildcard(_) => {
                    for source in &scope.sources {
                        out.extend(source.columns.as_ref()?.iter().cloned());
                    }
                }
                SelectItem::QualifiedWildcard(..) => {
                    let wanted = wildcard_qualifier(item);
                    for source in scope.sources.iter().filter(|s| s.is_named(&wanted)) {
                        out.extend(source.columns.as_ref()?.iter().cloned());
                    }
                }
                #[allow(unreachable_patterns)]
                _ => return None,
            }
        }
        Some(out)
    }

    /// GROUP BY / ORDER BY item that may name a projection alias.
    fn resolve_or_alias(&mut self, expr: &mut Expr, aliases: &[String]) -> TranslationResult<()> {
        if let Expr::Identifier(name) = expr {
            if aliases.iter().any(|a| same(name, a)) {
                return Ok(());
            }
        }
        self.resolve(expr)
    }

    /// Qualify the columns of `node`, outside nested queries, which get a
    /// scope of their own.
    fn resolve<T: VisitMut + ?Sized>(&mut self, node: &mut T) -> TranslationResult<()> {
        let mut resolver = Resolver {
            qualifier: self,
            depth: 0,
            lambdas: 0,
        };
        match node.visit(&mut resolver) {
            ControlFlow::Break(err) => Err(err),
            ControlFlow::Continue(()) => Ok(()),
        }
    }

    fn column(&self, expr: &mut Expr) -> TranslationResult<()> {
        let Some((qualifier, name)) = column(expr) else {
            return Ok(());
        };
        if self.guards.is_guard(&name.value) || qualifier.iter().any(|q| self.guards.is_guard(&q.value)) {
            return Ok(());
        }
        let (qualifier, name) = (qualifier.to_vec(), name.clone());
        match qualifier.last() {
            Some(q) => self.qualified(q, &qualifier, &name),
            None => {
                if let Some(owner) = self.unqualified(&name)? {
                    *expr = Expr::CompoundIdentifier(vec![owner, name]);
                }
                Ok(())
            }
        }
    }

    fn qualified(&self, q: &Ident, qualifier: &[Ident], name: &Ident) -> TranslationResult<()> {
        let source = self
            .scopes
            .iter()
            .rev()
            .flat_map(|s| s.sources.iter())
            .find(|s| s.is_named(&q.value));
        let Some(source) = source else {
            if self.scopes.iter().any(|s| s.sources.iter().any(Source::is_open)) {
                return Ok(());
            }
            let joined: Vec<&str> = qualifier.iter().map(|i| i.value.as_str()).collect();
            return Err(TranslationError::UnknownTable(joined.join(".")));
        };
        let Some(columns) = &source.columns else {
            return Ok(());
        };
        if source.column(&name.value).is_some() {
            return Ok(());
        }
        Err(TranslationError::unknown_column(
            format!("{}.{}", q.value, name.value),
            did_you_mean(&name.value, columns.iter().map(|(c, _)| c.as_str())),
        ))
    }

    /// The source an unqualified column belongs to, when it can be named.
    fn unqualified(&self, name: &Ident) -> TranslationResult<Option<Ident>> {
        for scope in self.scopes.iter().rev() {
            let mut matches = scope.sources.iter().filter(|s| s.column(&name.value).is_some());
            match (matches.next(), matches.next()) {
                (None, _) => continue,
                (Some(source), None) => return Ok(source.name.clone()),
                (Some(_), Some(_)) => {
                    return Err(TranslationError::AmbiguousColumn(name.value.clone()));
                }
            }
        }

        let innermost = self.scopes.last().map(|s| s.sources.as_slice()).unwrap_or_default();
        let mut open = innermost.iter().filter(|s| s.is_open());
        if let (Some(only), None) = (open.next(), open.next()) {
            return Ok(only.name.clone());
        }
        if self.scopes.iter().any(|s| s.sources.iter().any(Source::is_open)) {
            return Ok(None);
        }
        let known = self
            .scopes
            .iter()
            .flat_map(|s| s.sources.iter())
            .filter_map(|s| s.columns.as_ref())
            .flat_map(|cols| cols.iter().map(|(c, _)| c.as_str()));
        Err(TranslationError::unknown_column(
            name.value.clone(),
            did_you_mean(&name.value, known),
        ))
    }
}

impl ColumnTypes for Qualifier<'_> {
    fn column_type(&self, qualifier: Option<&str>, name: &str) -> Option<TypeKind> {
        let mut sources = self.scopes.iter().rev().flat_map(|s| s.sources.iter());
        let found = match qualifier {
            Some(q) => sources.filter(|s| s.is_named(q)).find_map(|s| s.column(name)),
            None => sources.find_map(|s| s.column(name)),
        };
        found?.1
    }
}

/// Unnamed projection expressions become `expr AS _col_<i>`.
fn name_projection(select: &mut Select) {
    for (i, item) in select.projection.iter_mut().enumerate() {
        let SelectItem::UnnamedExpr(expr) = item else {
            continue;
        };
        if column(expr).is_some() {
            continue;
        }
        let expr = take(expr);
        *item = SelectItem::ExprWithAlias {
            expr,
            alias: Ident::new(format!("_col_{}", i)),
        };
    }
}

struct Resolver<'r, 'a> {
    qualifier: &'r mut Qualifier<'a>,
    depth: usize,
    /// Lambda parameters are not columns.
    lambdas: usize,
}

impl VisitorMut for Resolver<'_, '_> {
    type Break = TranslationError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<TranslationError> {
        if self.depth == 0 {
            if let Err(err) = self.qualifier.query(query) {
                return ControlFlow::Break(err);
            }
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<TranslationError> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<TranslationError> {
        if matches!(expr, Expr::Lambda(_)) {
            self.lambdas += 1;
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<TranslationError> {
        if matches!(expr, Expr::Lambda(_)) {
            self.lambdas -= 1;
            return ControlFlow::Continue(());
        }
        if self.depth > 0 || self.lambdas > 0 {
            return ControlFlow::Continue(());
        }
        match self.qualifier.column(expr) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => ControlFlow::Break(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::parse_dunesql;
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new()
            .with_table("tbl", [("col", TypeKind::Double), ("x", TypeKind::Integer)])
            .with_table("other", [("id", TypeKind::Integer), ("x", TypeKind::Integer)])
    }

    fn run(sql: &str, schema: &Schema) -> TranslationResult<String> {
        let mut statements = parse_dunesql(sql)?;
        qualify(&mut statements, schema, &ParameterMap::default(), SourceDialect::Postgres)?;
        Ok(Renderer::dunesql(false).render(&mut statements))
    }

    #[test]
    fn test_unqualified_columns_get_their_table() {
        assert_eq!(
            run("SELECT col, o.id FROM tbl JOIN other AS o ON id = col", &schema()).unwrap(),
            "SELECT tbl.col, o.id FROM tbl JOIN other AS o ON o.id = tbl.col"
        );
    }

    #[test]
    fn test_unnamed_projection_aliased() {
        assert_eq!(
            run("SELECT col + 1, x AS y FROM tbl", &schema()).unwrap(),
            "SELECT tbl.col + 1 AS _col_0, tbl.x AS y FROM tbl"
        );
    }

    #[test]
    fn test_unknown_column() {
        let schema = Schema::new().with_table("tbl", [("x", TypeKind::Integer)]);
        let err = run("SELECT col FROM tbl", &schema).unwrap_err();
        assert_eq!(err.to_string(), "Unknown column: col");
        let err = run("SELECT colx FROM tbl", &self::schema()).unwrap_err();
        assert!(matches!(err, TranslationError::UnknownColumn { suggestion: Some(ref s), .. } if s == "col"));
    }

    #[test]
    fn test_ambiguous_and_unknown_table() {
        let err = run("SELECT x FROM tbl, other", &schema()).unwrap_err();
        assert!(matches!(err, TranslationError::AmbiguousColumn(ref c) if c == "x"));
        let err = run("SELECT z.x FROM tbl", &schema()).unwrap_err();
        assert!(matches!(err, TranslationError::UnknownTable(ref t) if t == "z"));
    }

    #[test]
    fn test_open_sources() {
        assert_eq!(
            run("SELECT a FROM mystery", &schema()).unwrap(),
            "SELECT mystery.a FROM mystery"
        );
        assert_eq!(
            run("SELECT a FROM mystery, enigma", &schema()).unwrap(),
            "SELECT a FROM mystery, enigma"
        );
    }

    #[test]
    fn test_derived_tables_ctes_and_correlation() {
        assert_eq!(
            run(
                "WITH c AS (SELECT x AS n FROM tbl) SELECT n FROM c WHERE EXISTS (SELECT 1 FROM other WHERE id = n)",
                &schema()
            )
            .unwrap(),
            "WITH c AS (SELECT tbl.x AS n FROM tbl) SELECT c.n FROM c WHERE EXISTS (SELECT 1 AS _col_0 FROM other WHERE other.id = c.n)"
        );
    }

    #[test]
    fn test_order_by_alias_left_alone() {
        assert_eq!(
            run("SELECT x AS total FROM tbl ORDER BY total DESC", &schema()).unwrap(),
            "SELECT tbl.x AS total FROM tbl ORDER BY total DESC"
        );
    }

    #[test]
    fn test_unnest_alias_columns() {
        assert_eq!(
            run("SELECT v FROM tbl CROSS JOIN UNNEST(ARRAY[1]) AS u(v)", &schema()).unwrap(),
            "SELECT u.v FROM tbl CROSS JOIN UNNEST(ARRAY[1]) AS u(v)"
        );
    }

}
