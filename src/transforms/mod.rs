//! Rewrite pipeline.
//!
//! Each [`Rewrite`] sees the tree through a `sqlparser` [`VisitorMut`] walk:
//! whole queries on the way down, expressions on the way up, so a rewrite
//! always sees children that the same pass has already settled. The
//! [`RewriteRegistry`] runs the passes one after another, highest priority
//! first.

mod casts;
mod explode;
mod functions;
mod literals;
mod qualify;

pub use casts::{NumericColumnCast, RedundantBinaryCall, VarcharLength};
pub use explode::ExplodeToUnnest;
pub use functions::{BinaryConcat, LegacyFunctionRename, TargetSpellings};
pub use literals::{BooleanStrings, HexStrings, IntervalLiterals, TimestampStrings};
pub use qualify::EliminateQualify;

use std::ops::ControlFlow;

use sqlparser::ast::{Expr, Query, Statement, VisitMut, VisitorMut};

use crate::ast::{is_call, is_comparison};
use crate::dialect::SourceDialect;
use crate::guard::ParameterMap;

/// What a pass may know about the translation it runs in.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub source: SourceDialect,
    /// A schema will type-check the tree after the pipeline.
    pub typed: bool,
    pub guards: &'a ParameterMap,
}

impl<'a> PassContext<'a> {
    pub fn new(source: SourceDialect, guards: &'a ParameterMap) -> Self {
        Self {
            source,
            typed: false,
            guards,
        }
    }

    pub fn typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }
}

/// The node an expression hangs under, as far as the passes care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// A clause of a query, or nothing at all.
    Clause,
    Cast,
    /// `FROM_HEX(..)` or `UNHEX(..)`.
    Decode,
    /// A side of `=`, `<>`, `<`, `<=`, `>` or `>=`.
    Comparison,
    Other,
}

impl Parent {
    fn of(expr: &Expr) -> Self {
        match expr {
            Expr::Cast { .. } => Parent::Cast,
            Expr::Function(f) if is_call(f, "from_hex") || is_call(f, "unhex") => Parent::Decode,
            Expr::BinaryOp { op, .. } if is_comparison(op) => Parent::Comparison,
            _ => Parent::Other,
        }
    }
}

/// One rewrite pass.
pub trait Rewrite: Send + Sync {
    fn id(&self) -> &'static str;

    fn priority(&self) -> u32 {
        100
    }

    /// Rewrite `expr` in place once its children are done. Returns whether
    /// anything changed.
    fn rewrite_expr(&self, _expr: &mut Expr, _parent: Parent, _ctx: &PassContext<'_>) -> bool {
        false
    }

    /// Rewrite `query` before its parts are visited. Returns the number of
    /// changes.
    fn rewrite_query(&self, _query: &mut Query, _ctx: &PassContext<'_>) -> usize {
        0
    }
}

/// Ordered set of rewrite passes.
pub struct RewriteRegistry {
    passes: Vec<Box<dyn Rewrite>>,
}

impl Default for RewriteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRegistry {
    /// Registry with every built-in pass.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Box::new(BooleanStrings));
        registry.register(Box::new(TimestampStrings));
        registry.register(Box::new(NumericColumnCast));
        registry.register(Box::new(LegacyFunctionRename));
        registry.register(Box::new(HexStrings));
        registry.register(Box::new(RedundantBinaryCall));
        registry.register(Box::new(BinaryConcat));
        registry.register(Box::new(VarcharLength));
        registry.register(Box::new(ExplodeToUnnest));
        registry.register(Box::new(EliminateQualify));
        registry.register(Box::new(IntervalLiterals));
        registry.register(Box::new(TargetSpellings));

        registry
    }

    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    /// Register a pass, keeping passes sorted by descending priority.
    pub fn register(&mut self, pass: Box<dyn Rewrite>) {
        self.passes.push(pass);
        self.passes.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Pass ids in execution order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.id()).collect()
    }

    /// Apply every pass to the statements.
    pub fn run(&self, statements: &mut [Statement], ctx: &PassContext<'_>) {
        for pass in &self.passes {
            let changed = apply(pass.as_ref(), statements, ctx);
            if changed > 0 {
                tracing::debug!(pass = pass.id(), nodes = changed, "rewrite applied");
            }
        }
    }
}

struct PassWalk<'p, 'c> {
    pass: &'p dyn Rewrite,
    ctx: &'p PassContext<'c>,
    parents: Vec<Parent>,
    changed: usize,
}

impl VisitorMut for PassWalk<'_, '_> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<()> {
        self.changed += self.pass.rewrite_query(query, self.ctx);
        self.parents.push(Parent::Clause);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<()> {
        self.parents.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        self.parents.push(Parent::of(expr));
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        self.parents.pop();
        let parent = self.parents.last().copied().unwrap_or(Parent::Clause);
        if self.pass.rewrite_expr(expr, parent, self.ctx) {
            self.changed += 1;
        }
        ControlFlow::Continue(())
    }
}

/// Run one pass over every statement. Returns the number of rewrites.
pub fn apply(pass: &dyn Rewrite, statements: &mut [Statement], ctx: &PassContext<'_>) -> usize {
    let mut walk = PassWalk {
        pass,
        ctx,
        parents: Vec::new(),
        changed: 0,
    };
    for statement in statements.iter_mut() {
        let _ = statement.visit(&mut walk);
    }
    walk.changed
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::dialect::parse;
    use crate::render::Renderer;

    /// Parse with the source dialect, run one pass, print compact DuneSQL.
    pub fn run_one(pass: &dyn Rewrite, sql: &str, source: SourceDialect) -> String {
        run_with(pass, sql, source, false)
    }

    pub fn run_with(pass: &dyn Rewrite, sql: &str, source: SourceDialect, typed: bool) -> String {
        let guards = ParameterMap::extract(sql);
        let protected = guards.protect(sql);
        let mut statements = parse(&protected, source).unwrap();
        let ctx = PassContext::new(source, &guards).typed(typed);
        apply(pass, &mut statements, &ctx);
        guards.restore(&Renderer::new(source, false).render(&mut statements))
    }
}
