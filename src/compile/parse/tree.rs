//! Node types produced by the [`Parser`][`crate::compile::Parser`].
//!
//! Statements own their children. Nodes that may be referenced by a runtime
//! value after the statement that defined them has finished (macros, loops,
//! blocks and call blocks) are kept behind an [`Arc`].
use crate::{region::Region, render::Value};
use indexmap::IndexMap;
use std::{fmt::Display, sync::Arc};

/// Root of a compiled template.
#[derive(Debug, Clone, Default)]
pub struct Template {
    /// Top level statements, in render order.
    pub body: Vec<Stmt>,
    /// Every block defined anywhere in the template, by name.
    pub blocks: IndexMap<String, Arc<Block>>,
    /// Top level macros, by name.
    pub macros: IndexMap<String, Arc<Macro>>,
    /// Name of the parent template and the region of the `extends` tag.
    pub extends: Option<(String, Region)>,
}

/// Statement nodes.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Template data and printed expressions.
    Output(Output),
    If(If),
    For(Arc<For>),
    Block(Arc<Block>),
    Macro(Arc<Macro>),
    CallBlock(Arc<CallBlock>),
    FilterBlock(FilterBlock),
    With(With),
    Namespace(NamespaceBlock),
    Export(Export),
    Assign(Assign),
    AssignBlock(AssignBlock),
    Import(Import),
    FromImport(FromImport),
    Include(Include),
    Extends(Extends),
    Trans(Arc<Trans>),
    Break(Region),
    Continue(Region),
    Do(Do),
    Spaceless(Spaceless),
    Scope(Scope),
    Autoescape(Autoescape),
}

impl Stmt {
    /// Return the [`Region`] of the statement.
    pub fn region(&self) -> Region {
        match self {
            Stmt::Output(o) => o.region,
            Stmt::If(i) => i.region,
            Stmt::For(f) => f.region,
            Stmt::Block(b) => b.region,
            Stmt::Macro(m) => m.region,
            Stmt::CallBlock(c) => c.region,
            Stmt::FilterBlock(f) => f.region,
            Stmt::With(w) => w.region,
            Stmt::Namespace(n) => n.region,
            Stmt::Export(e) => e.region,
            Stmt::Assign(a) => a.region,
            Stmt::AssignBlock(a) => a.region,
            Stmt::Import(i) => i.region,
            Stmt::FromImport(f) => f.region,
            Stmt::Include(i) => i.region,
            Stmt::Extends(e) => e.region,
            Stmt::Trans(t) => t.region,
            Stmt::Break(region) | Stmt::Continue(region) => *region,
            Stmt::Do(d) => d.region,
            Stmt::Spaceless(s) => s.region,
            Stmt::Scope(s) => s.region,
            Stmt::Autoescape(a) => a.region,
        }
    }
}

/// Template data and `{{ }}` expressions, rendered in order.
#[derive(Debug, Clone)]
pub struct Output {
    pub nodes: Vec<Expr>,
    pub region: Region,
}

/// An `if` statement with any number of `elif` branches.
#[derive(Debug, Clone)]
pub struct If {
    /// The `if` and `elif` branches, tested in order.
    pub branches: Vec<(Expr, Vec<Stmt>)>,
    pub otherwise: Option<Vec<Stmt>>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct For {
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    /// Rendered when the iterable produced no items.
    pub otherwise: Option<Vec<Stmt>>,
    /// Items for which this is falsy are skipped before counting.
    pub filter: Option<Expr>,
    pub recursive: bool,
    pub is_async: bool,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub body: Vec<Stmt>,
    pub scoped: bool,
    pub required: bool,
    pub region: Region,
}

/// Parameters of a macro or call block.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub positional: Vec<Param>,
    /// Parameters after a bare `*`, only bound by name.
    pub keyword_only: Vec<Param>,
    /// Name given to `*args`.
    pub varargs: Option<String>,
    /// Name given to `**kwargs`.
    pub kwargs: Option<String>,
}

impl Params {
    /// Return true if a parameter with the given name is declared.
    pub fn declares(&self, name: &str) -> bool {
        self.positional.iter().any(|p| p.name == name)
            || self.keyword_only.iter().any(|p| p.name == name)
            || self.varargs.as_deref() == Some(name)
            || self.kwargs.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub params: Params,
    pub body: Vec<Stmt>,
    /// The body refers to `caller`.
    pub uses_caller: bool,
    /// The body refers to `varargs` without declaring `*args`.
    pub uses_varargs: bool,
    /// The body refers to `kwargs` without declaring `**kwargs`.
    pub uses_kwargs: bool,
    pub region: Region,
}

/// `{% call %}`, which passes its body to a macro as `caller`.
#[derive(Debug, Clone)]
pub struct CallBlock {
    /// The macro call, always an [`Expr::Call`].
    pub call: Expr,
    /// The body, wrapped as an anonymous macro.
    pub caller: Arc<Macro>,
    pub region: Region,
}

/// `{% filter %}`, which applies filters to its rendered body.
#[derive(Debug, Clone)]
pub struct FilterBlock {
    /// Filters without a target, applied in order.
    pub filters: Vec<Filter>,
    pub body: Vec<Stmt>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct With {
    pub targets: Vec<Expr>,
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub region: Region,
}

/// `{% namespace name %}`, which collects the names set within its body
/// into a namespace object bound to `name`.
#[derive(Debug, Clone)]
pub struct NamespaceBlock {
    pub name: String,
    pub body: Vec<Stmt>,
    pub region: Region,
}

/// `{% export a, b %}`, which limits the names visible when the template
/// is imported.
#[derive(Debug, Clone)]
pub struct Export {
    pub names: Vec<(String, Region)>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub target: Expr,
    pub value: Expr,
    pub region: Region,
}

/// `{% set name %}...{% endset %}`, optionally filtered.
#[derive(Debug, Clone)]
pub struct AssignBlock {
    pub target: Expr,
    pub filters: Vec<Filter>,
    pub body: Vec<Stmt>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub template: Expr,
    pub alias: String,
    pub with_context: bool,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct FromImport {
    pub template: Expr,
    /// Imported names, with an optional alias.
    pub names: Vec<(String, Option<String>, Region)>,
    pub with_context: bool,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Include {
    /// A name, or a list of names where the first one found is used.
    pub template: Expr,
    pub ignore_missing: bool,
    pub with_context: bool,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Extends {
    pub template: Expr,
    pub region: Region,
}

/// `{% trans %}` and `{% blocktrans %}`.
///
/// Messages use `%(name)s` placeholders for the variables referenced in
/// the body, and `%%` for a literal percent sign.
#[derive(Debug, Clone)]
pub struct Trans {
    /// Message context, which selects `pgettext`.
    pub context: Option<String>,
    /// Variables bound in the tag.
    pub variables: Vec<(String, Expr)>,
    /// Names used in the body without being bound in the tag.
    pub referenced: Vec<String>,
    /// Name of the variable holding the count.
    pub count: Option<String>,
    pub singular: String,
    pub plural: Option<String>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Do {
    pub expr: Expr,
    pub region: Region,
}

/// `{% spaceless %}`, which removes whitespace between markup tags.
#[derive(Debug, Clone)]
pub struct Spaceless {
    pub body: Vec<Stmt>,
    pub region: Region,
}

/// `{% scope %}`, whose assignments do not leak.
#[derive(Debug, Clone)]
pub struct Scope {
    pub body: Vec<Stmt>,
    pub region: Region,
}

/// `{% autoescape %}`, which changes the escaping policy for its body.
#[derive(Debug, Clone)]
pub struct Autoescape {
    pub enabled: Expr,
    pub body: Vec<Stmt>,
    pub region: Region,
}

/// How a [`Name`], [`Tuple`], [`Getattr`] or [`Getitem`] is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCtx {
    /// Read a value.
    #[default]
    Load,
    /// Assignment target.
    Store,
    /// Parameter binding.
    Param,
}

/// Expression nodes.
#[derive(Debug, Clone)]
pub enum Expr {
    Const(Const),
    Name(Name),
    TemplateData(Data),
    List(List),
    Tuple(Tuple),
    Dict(Dict),
    Bin(Box<BinExpr>),
    Unary(Box<UnaryExpr>),
    Call(Box<Call>),
    Getattr(Box<Getattr>),
    Getitem(Box<Getitem>),
    Slice(Box<Slice>),
    Concat(Concat),
    Compare(Box<Compare>),
    Cond(Box<CondExpr>),
    Filter(Box<Filter>),
    Test(Box<Test>),
    NsRef(NsRef),
    Await(Box<Await>),
    /// Marks the inner value safe.
    MarkSafe(Box<Expr>, Region),
    /// Marks the inner value safe only while autoescaping is active.
    MarkSafeIfAutoescape(Box<Expr>, Region),
}

impl Expr {
    /// Return the [`Region`] of the expression.
    pub fn region(&self) -> Region {
        match self {
            Expr::Const(c) => c.region,
            Expr::Name(n) => n.region,
            Expr::TemplateData(d) => d.region,
            Expr::List(l) => l.region,
            Expr::Tuple(t) => t.region,
            Expr::Dict(d) => d.region,
            Expr::Bin(b) => b.region,
            Expr::Unary(u) => u.region,
            Expr::Call(c) => c.region,
            Expr::Getattr(g) => g.region,
            Expr::Getitem(g) => g.region,
            Expr::Slice(s) => s.region,
            Expr::Concat(c) => c.region,
            Expr::Compare(c) => c.region,
            Expr::Cond(c) => c.region,
            Expr::Filter(f) => f.region,
            Expr::Test(t) => t.region,
            Expr::NsRef(n) => n.region,
            Expr::Await(a) => a.region,
            Expr::MarkSafe(_, region) | Expr::MarkSafeIfAutoescape(_, region) => *region,
        }
    }

    /// Return the name if this is a plain [`Expr::Name`].
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(&name.name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Name {
    pub name: String,
    pub ctx: SetCtx,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Data {
    pub text: String,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct List {
    pub items: Vec<Expr>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Tuple {
    pub items: Vec<Expr>,
    pub ctx: SetCtx,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Dict {
    pub pairs: Vec<Pair>,
    pub region: Region,
}

/// A `key: value` item of a dict literal.
#[derive(Debug, Clone)]
pub struct Pair {
    pub key: Expr,
    pub value: Expr,
    pub region: Region,
}

/// Operators of a [`BinExpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone)]
pub struct BinExpr {
    pub op: BinOp,
    pub left: Expr,
    pub right: Expr,
    pub region: Region,
}

/// Operators of a [`UnaryExpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Expr,
    pub region: Region,
}

/// Arguments at a call site.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Expr>,
    pub named: Vec<Keyword>,
    /// `*expr`, spread into positional arguments.
    pub spread: Option<Expr>,
    /// `**expr`, spread into named arguments.
    pub spread_named: Option<Expr>,
}

impl Args {
    /// Return true if there are no arguments of any kind.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
            && self.named.is_empty()
            && self.spread.is_none()
            && self.spread_named.is_none()
    }

    /// Iterate over every argument expression.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.positional
            .iter()
            .chain(self.named.iter().map(|k| &k.value))
            .chain(self.spread.iter())
            .chain(self.spread_named.iter())
    }
}

/// A `name=value` argument.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Expr,
    pub args: Args,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Getattr {
    pub target: Expr,
    pub attr: String,
    pub ctx: SetCtx,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Getitem {
    pub target: Expr,
    pub key: Expr,
    pub ctx: SetCtx,
    pub region: Region,
}

/// `start:stop:step`, only valid as the key of a [`Getitem`].
#[derive(Debug, Clone)]
pub struct Slice {
    pub start: Option<Expr>,
    pub stop: Option<Expr>,
    pub step: Option<Expr>,
    pub region: Region,
}

/// `a ~ b ~ c`
#[derive(Debug, Clone)]
pub struct Concat {
    pub items: Vec<Expr>,
    pub region: Region,
}

/// Operators of a comparison [`Operand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        };
        write!(f, "{text}")
    }
}

/// One link of a comparison chain.
#[derive(Debug, Clone)]
pub struct Operand {
    pub op: CompareOp,
    pub expr: Expr,
    pub region: Region,
}

/// `a < b <= c`, true when every link holds.
#[derive(Debug, Clone)]
pub struct Compare {
    pub first: Expr,
    pub ops: Vec<Operand>,
    pub region: Region,
}

/// `a if b else c`
#[derive(Debug, Clone)]
pub struct CondExpr {
    pub test: Expr,
    pub then: Expr,
    pub otherwise: Option<Expr>,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Filter {
    /// The filtered value, absent in filter blocks.
    pub target: Option<Expr>,
    pub name: String,
    pub args: Args,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Test {
    pub target: Expr,
    pub name: String,
    pub args: Args,
    pub region: Region,
}

/// `ns.attr` as an assignment target.
#[derive(Debug, Clone)]
pub struct NsRef {
    pub name: String,
    pub attr: String,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Await {
    pub operand: Expr,
    pub region: Region,
}
