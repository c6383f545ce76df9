//! Traversal over the nodes of a [`tree`][`super::tree`].
use super::tree::{Args, Expr, Filter, SetCtx, Stmt};
use crate::security::grow_stack;
use std::ops::ControlFlow;

/// Decision returned by a [`Visitor`] for each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Visit the children of this node.
    Descend,
    /// Do not visit the children of this node.
    Skip,
    /// End the traversal.
    Stop,
}

/// Receives nodes during a traversal started with [`walk_stmts`] or [`walk_expr`].
pub trait Visitor {
    fn visit_stmt(&mut self, _stmt: &Stmt) -> Visit {
        Visit::Descend
    }

    fn visit_expr(&mut self, _expr: &Expr) -> Visit {
        Visit::Descend
    }
}

/// Walk every statement in order.
///
/// Returns [`ControlFlow::Break`] if the visitor requested the traversal stop.
pub fn walk_stmts<V: Visitor>(visitor: &mut V, stmts: &[Stmt]) -> ControlFlow<()> {
    grow_stack(|| -> ControlFlow<()> {
        for stmt in stmts {
            walk_stmt(visitor, stmt)?;
        }

        ControlFlow::Continue(())
    })
}

/// Walk a statement and its children.
pub fn walk_stmt<V: Visitor>(visitor: &mut V, stmt: &Stmt) -> ControlFlow<()> {
    match visitor.visit_stmt(stmt) {
        Visit::Stop => return ControlFlow::Break(()),
        Visit::Skip => return ControlFlow::Continue(()),
        Visit::Descend => {}
    }

    match stmt {
        Stmt::Output(output) => {
            for node in &output.nodes {
                walk_expr(visitor, node)?;
            }
        }
        Stmt::If(i) => {
            for (test, body) in &i.branches {
                walk_expr(visitor, test)?;
                walk_stmts(visitor, body)?;
            }
            if let Some(otherwise) = &i.otherwise {
                walk_stmts(visitor, otherwise)?;
            }
        }
        Stmt::For(f) => {
            walk_expr(visitor, &f.target)?;
            walk_expr(visitor, &f.iter)?;
            if let Some(filter) = &f.filter {
                walk_expr(visitor, filter)?;
            }
            walk_stmts(visitor, &f.body)?;
            if let Some(otherwise) = &f.otherwise {
                walk_stmts(visitor, otherwise)?;
            }
        }
        Stmt::Block(b) => walk_stmts(visitor, &b.body)?,
        Stmt::Macro(m) => {
            for param in m.params.positional.iter().chain(&m.params.keyword_only) {
                if let Some(default) = &param.default {
                    walk_expr(visitor, default)?;
                }
            }
            walk_stmts(visitor, &m.body)?;
        }
        Stmt::CallBlock(c) => {
            walk_expr(visitor, &c.call)?;
            walk_stmt(visitor, &Stmt::Macro(c.caller.clone()))?;
        }
        Stmt::FilterBlock(f) => {
            walk_filters(visitor, &f.filters)?;
            walk_stmts(visitor, &f.body)?;
        }
        Stmt::With(w) => {
            for expr in w.targets.iter().chain(&w.values) {
                walk_expr(visitor, expr)?;
            }
            walk_stmts(visitor, &w.body)?;
        }
        Stmt::Namespace(n) => walk_stmts(visitor, &n.body)?,
        Stmt::Export(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        Stmt::Assign(a) => {
            walk_expr(visitor, &a.target)?;
            walk_expr(visitor, &a.value)?;
        }
        Stmt::AssignBlock(a) => {
            walk_expr(visitor, &a.target)?;
            walk_filters(visitor, &a.filters)?;
            walk_stmts(visitor, &a.body)?;
        }
        Stmt::Import(i) => walk_expr(visitor, &i.template)?,
        Stmt::FromImport(f) => walk_expr(visitor, &f.template)?,
        Stmt::Include(i) => walk_expr(visitor, &i.template)?,
        Stmt::Extends(e) => walk_expr(visitor, &e.template)?,
        Stmt::Trans(t) => {
            for (_, expr) in &t.variables {
                walk_expr(visitor, expr)?;
            }
        }
        Stmt::Do(d) => walk_expr(visitor, &d.expr)?,
        Stmt::Spaceless(s) => walk_stmts(visitor, &s.body)?,
        Stmt::Scope(s) => walk_stmts(visitor, &s.body)?,
        Stmt::Autoescape(a) => {
            walk_expr(visitor, &a.enabled)?;
            walk_stmts(visitor, &a.body)?;
        }
    }

    ControlFlow::Continue(())
}

/// Walk an expression and its children.
pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expr) -> ControlFlow<()> {
    grow_stack(|| walk_expr_inner(visitor, expr))
}

fn walk_expr_inner<V: Visitor>(visitor: &mut V, expr: &Expr) -> ControlFlow<()> {
    match visitor.visit_expr(expr) {
        Visit::Stop => return ControlFlow::Break(()),
        Visit::Skip => return ControlFlow::Continue(()),
        Visit::Descend => {}
    }

    match expr {
        Expr::Const(_) | Expr::Name(_) | Expr::TemplateData(_) | Expr::NsRef(_) => {}
        Expr::List(l) => walk_exprs(visitor, &l.items)?,
        Expr::Tuple(t) => walk_exprs(visitor, &t.items)?,
        Expr::Concat(c) => walk_exprs(visitor, &c.items)?,
        Expr::Dict(d) => {
            for pair in &d.pairs {
                walk_expr(visitor, &pair.key)?;
                walk_expr(visitor, &pair.value)?;
            }
        }
        Expr::Bin(b) => {
            walk_expr(visitor, &b.left)?;
            walk_expr(visitor, &b.right)?;
        }
        Expr::Unary(u) => walk_expr(visitor, &u.operand)?,
        Expr::Call(c) => {
            walk_expr(visitor, &c.callee)?;
            walk_args(visitor, &c.args)?;
        }
        Expr::Getattr(g) => walk_expr(visitor, &g.target)?,
        Expr::Getitem(g) => {
            walk_expr(visitor, &g.target)?;
            walk_expr(visitor, &g.key)?;
        }
        Expr::Slice(s) => {
            for part in [&s.start, &s.stop, &s.step].into_iter().flatten() {
                walk_expr(visitor, part)?;
            }
        }
        Expr::Compare(c) => {
            walk_expr(visitor, &c.first)?;
            for operand in &c.ops {
                walk_expr(visitor, &operand.expr)?;
            }
        }
        Expr::Cond(c) => {
            walk_expr(visitor, &c.test)?;
            walk_expr(visitor, &c.then)?;
            if let Some(otherwise) = &c.otherwise {
                walk_expr(visitor, otherwise)?;
            }
        }
        Expr::Filter(f) => {
            if let Some(target) = &f.target {
                walk_expr(visitor, target)?;
            }
            walk_args(visitor, &f.args)?;
        }
        Expr::Test(t) => {
            walk_expr(visitor, &t.target)?;
            walk_args(visitor, &t.args)?;
        }
        Expr::Await(a) => walk_expr(visitor, &a.operand)?,
        Expr::MarkSafe(inner, _) | Expr::MarkSafeIfAutoescape(inner, _) => {
            walk_expr(visitor, inner)?
        }
    }

    ControlFlow::Continue(())
}

fn walk_exprs<V: Visitor>(visitor: &mut V, exprs: &[Expr]) -> ControlFlow<()> {
    for expr in exprs {
        walk_expr(visitor, expr)?;
    }

    ControlFlow::Continue(())
}

fn walk_args<V: Visitor>(visitor: &mut V, args: &Args) -> ControlFlow<()> {
    for expr in args.exprs() {
        walk_expr(visitor, expr)?;
    }

    ControlFlow::Continue(())
}

fn walk_filters<V: Visitor>(visitor: &mut V, filters: &[Filter]) -> ControlFlow<()> {
    for filter in filters {
        walk_args(visitor, &filter.args)?;
    }

    ControlFlow::Continue(())
}

/// Finds which of a set of names are read within a body, without looking
/// into nested macros or blocks.
pub struct NameFinder<'a> {
    names: &'a [&'a str],
    found: Vec<bool>,
}

impl<'a> NameFinder<'a> {
    /// Return, for each of the given names, whether it is loaded anywhere
    /// within the statements.
    pub fn find(names: &'a [&'a str], stmts: &[Stmt]) -> Vec<bool> {
        let mut finder = Self {
            names,
            found: vec![false; names.len()],
        };
        let _ = walk_stmts(&mut finder, stmts);

        finder.found
    }
}

impl Visitor for NameFinder<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> Visit {
        match stmt {
            Stmt::Macro(_) | Stmt::Block(_) => Visit::Skip,
            Stmt::Trans(trans) => {
                for (index, name) in self.names.iter().enumerate() {
                    if trans.referenced.iter().any(|r| r == name) {
                        self.found[index] = true;
                    }
                }
                Visit::Descend
            }
            _ => Visit::Descend,
        }
    }

    fn visit_expr(&mut self, expr: &Expr) -> Visit {
        if let Expr::Name(name) = expr {
            if name.ctx == SetCtx::Load {
                if let Some(index) = self.names.iter().position(|n| *n == name.name) {
                    self.found[index] = true;
                }
            }
        }

        match self.found.iter().all(|found| *found) {
            true => Visit::Stop,
            false => Visit::Descend,
        }
    }
}

/// Set the context of every [`Name`][`super::tree::Name`],
/// [`Tuple`][`super::tree::Tuple`], [`Getattr`][`super::tree::Getattr`] and
/// [`Getitem`][`super::tree::Getitem`] within the expression.
pub fn set_ctx(expr: &mut Expr, ctx: SetCtx) {
    match expr {
        Expr::Name(name) => name.ctx = ctx,
        Expr::Tuple(tuple) => {
            tuple.ctx = ctx;
            for item in &mut tuple.items {
                set_ctx(item, ctx);
            }
        }
        Expr::Getattr(getattr) => {
            getattr.ctx = ctx;
            set_ctx(&mut getattr.target, ctx);
        }
        Expr::Getitem(getitem) => {
            getitem.ctx = ctx;
            set_ctx(&mut getitem.target, ctx);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{set_ctx, NameFinder};
    use crate::{
        compile::{
            tree::{Expr, SetCtx, Stmt},
            Options, Parser,
        },
        region::Region,
    };

    #[test]
    fn test_name_finder() {
        let root = parse("{{ caller() }}{% for x in varargs %}{% endfor %}");
        let found = NameFinder::find(&["caller", "varargs", "kwargs"], &root);

        assert_eq!(found, vec![true, true, false]);
    }

    #[test]
    fn test_name_finder_skips_nested_macro() {
        let root = parse("{% macro inner() %}{{ caller() }}{% endmacro %}");
        let found = NameFinder::find(&["caller"], &root);

        assert_eq!(found, vec![false]);
    }

    #[test]
    fn test_name_finder_ignores_store() {
        let root = parse("{% set caller = 1 %}");
        let found = NameFinder::find(&["caller"], &root);

        assert_eq!(found, vec![false]);
    }

    #[test]
    fn test_set_ctx_tuple() {
        let root = parse("{{ (a, b) }}");
        let Some(Stmt::Output(output)) = root.first() else {
            panic!("expected output");
        };
        let mut expr = output.nodes[0].clone();
        set_ctx(&mut expr, SetCtx::Store);

        let Expr::Tuple(tuple) = expr else {
            panic!("expected tuple");
        };
        assert_eq!(tuple.ctx, SetCtx::Store);
        assert!(tuple
            .items
            .iter()
            .all(|item| matches!(item, Expr::Name(n) if n.ctx == SetCtx::Store)));
    }

    #[test]
    fn test_region_of_statement() {
        let root = parse("ab{% do x %}");
        assert_eq!(root[1].region(), Region::new(2..12, root[1].region().position));
    }

    fn parse(source: &str) -> Vec<Stmt> {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap().body
    }
}
