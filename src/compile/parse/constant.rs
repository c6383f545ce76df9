//! Evaluation of expressions that do not depend on render time data.
//!
//! The parser folds constant output expressions as it flushes them, so
//! `{{ 60 * 60 }}` is stored as `3600`. Anything that can fail, or that
//! depends on filters, tests, globals or the escaping policy of the render,
//! is left for the renderer. So is repetition, like `'x' * 3`, because the
//! size of its result is checked against the policy of the render.
use super::tree::{
    Args, BinExpr, BinOp, Call, Compare, Concat, CondExpr, Const, Dict, Expr, Filter, Getattr,
    Getitem, List, Pair, Test, Tuple, UnaryExpr,
};
use crate::render::{
    compare::compare,
    operator::{binary, repeat_len, unary},
    Value,
};
use crate::security::grow_stack;
use indexmap::IndexMap;

/// What is known about the render while evaluating a constant.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext {
    /// Autoescaping is active.
    pub autoescape: bool,
    /// The escaping policy is not known yet, so anything that depends on
    /// it cannot be evaluated.
    pub volatile: bool,
}

impl EvalContext {
    /// Return an [`EvalContext`] for expressions folded at compile time.
    pub fn volatile() -> Self {
        Self {
            autoescape: false,
            volatile: true,
        }
    }
}

/// Returned when an expression cannot be evaluated without rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impossible;

/// Evaluate an expression that does not depend on render time data.
///
/// # Errors
///
/// Returns [`Impossible`] if the expression refers to a name, calls
/// something, or would raise an error.
pub fn as_const(expr: &Expr, ctx: &EvalContext) -> Result<Value, Impossible> {
    grow_stack(|| as_const_inner(expr, ctx))
}

fn as_const_inner(expr: &Expr, ctx: &EvalContext) -> Result<Value, Impossible> {
    match expr {
        Expr::Const(c) => Ok(c.value.clone()),
        Expr::TemplateData(data) => match ctx.volatile {
            true => Err(Impossible),
            false if ctx.autoescape => Ok(Value::markup(data.text.as_str())),
            false => Ok(Value::from(data.text.as_str())),
        },
        Expr::List(List { items, .. }) | Expr::Tuple(Tuple { items, .. }) => Ok(Value::from(
            items
                .iter()
                .map(|item| as_const(item, ctx))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Expr::Dict(dict) => {
            let mut map = IndexMap::new();
            for Pair { key, value, .. } in &dict.pairs {
                let key = match as_const(key, ctx)? {
                    Value::String(s) | Value::Markup(s) => s.to_string(),
                    key @ (Value::Int(_) | Value::Bool(_)) => key.to_string(),
                    _ => return Err(Impossible),
                };
                map.insert(key, as_const(value, ctx)?);
            }
            Ok(Value::from(map))
        }
        Expr::Bin(bin) => {
            let left = as_const(&bin.left, ctx)?;
            match bin.op {
                BinOp::And if !left.is_truthy() => Ok(left),
                BinOp::Or if left.is_truthy() => Ok(left),
                BinOp::And | BinOp::Or => as_const(&bin.right, ctx),
                op => {
                    let right = as_const(&bin.right, ctx)?;
                    if repeat_len(op, &left, &right).is_some() {
                        return Err(Impossible);
                    }
                    binary(op, &left, &right).map_err(|_| Impossible)
                }
            }
        }
        Expr::Unary(u) => unary(u.op, &as_const(&u.operand, ctx)?).map_err(|_| Impossible),
        Expr::Compare(cmp) => {
            let mut left = as_const(&cmp.first, ctx)?;
            for operand in &cmp.ops {
                let right = as_const(&operand.expr, ctx)?;
                if !compare(operand.op, &left, &right).map_err(|_| Impossible)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Cond(cond) => match as_const(&cond.test, ctx)?.is_truthy() {
            true => as_const(&cond.then, ctx),
            false => match &cond.otherwise {
                Some(otherwise) => as_const(otherwise, ctx),
                None => Err(Impossible),
            },
        },
        Expr::Concat(concat) => {
            let items = concat
                .items
                .iter()
                .map(|item| as_const(item, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            if items.iter().any(Value::is_markup) {
                // The result depends on whether the plain parts get escaped.
                return Err(Impossible);
            }
            Ok(Value::from(
                items.iter().map(|item| item.to_string()).collect::<String>(),
            ))
        }
        Expr::Getitem(item) if !matches!(item.key, Expr::Slice(_)) => {
            let target = as_const(&item.target, ctx)?;
            match target.get_item(&as_const(&item.key, ctx)?) {
                Value::Undefined => Err(Impossible),
                value => Ok(value),
            }
        }
        Expr::MarkSafe(inner, _) => Ok(Value::markup(as_const(inner, ctx)?.to_string())),
        Expr::MarkSafeIfAutoescape(inner, _) => match ctx.volatile {
            true => Err(Impossible),
            false if ctx.autoescape => Ok(Value::markup(as_const(inner, ctx)?.to_string())),
            false => as_const(inner, ctx),
        },
        _ => Err(Impossible),
    }
}

/// Fold the constant parts of an expression.
///
/// Subexpressions that cannot be evaluated are kept as they are, so the
/// renderer reports their errors at the right position.
pub fn optimize(expr: Expr) -> Expr {
    let expr = grow_stack(|| optimize_children(expr));
    if matches!(expr, Expr::Const(_) | Expr::TemplateData(_)) {
        return expr;
    }

    match as_const(&expr, &EvalContext::volatile()) {
        Ok(value) => Expr::Const(Const {
            value,
            region: expr.region(),
        }),
        Err(Impossible) => expr,
    }
}

fn optimize_children(expr: Expr) -> Expr {
    match expr {
        Expr::List(mut list) => {
            list.items = list.items.into_iter().map(optimize).collect();
            Expr::List(list)
        }
        Expr::Tuple(mut tuple) => {
            tuple.items = tuple.items.into_iter().map(optimize).collect();
            Expr::Tuple(tuple)
        }
        Expr::Dict(Dict { pairs, region }) => Expr::Dict(Dict {
            pairs: pairs
                .into_iter()
                .map(|pair| Pair {
                    key: optimize(pair.key),
                    value: optimize(pair.value),
                    region: pair.region,
                })
                .collect(),
            region,
        }),
        Expr::Bin(bin) => {
            let BinExpr {
                op,
                left,
                right,
                region,
            } = *bin;
            Expr::Bin(Box::new(BinExpr {
                op,
                left: optimize(left),
                right: optimize(right),
                region,
            }))
        }
        Expr::Unary(u) => {
            let UnaryExpr {
                op,
                operand,
                region,
            } = *u;
            Expr::Unary(Box::new(UnaryExpr {
                op,
                operand: optimize(operand),
                region,
            }))
        }
        Expr::Compare(cmp) => {
            let Compare { first, ops, region } = *cmp;
            Expr::Compare(Box::new(Compare {
                first: optimize(first),
                ops: ops
                    .into_iter()
                    .map(|mut operand| {
                        operand.expr = optimize(operand.expr);
                        operand
                    })
                    .collect(),
                region,
            }))
        }
        Expr::Cond(cond) => {
            let CondExpr {
                test,
                then,
                otherwise,
                region,
            } = *cond;
            Expr::Cond(Box::new(CondExpr {
                test: optimize(test),
                then: optimize(then),
                otherwise: otherwise.map(optimize),
                region,
            }))
        }
        Expr::Concat(Concat { items, region }) => Expr::Concat(Concat {
            items: items.into_iter().map(optimize).collect(),
            region,
        }),
        Expr::Filter(filter) => {
            let Filter {
                target,
                name,
                args,
                region,
            } = *filter;
            Expr::Filter(Box::new(Filter {
                target: target.map(optimize),
                name,
                args: optimize_args(args),
                region,
            }))
        }
        Expr::Test(test) => {
            let Test {
                target,
                name,
                args,
                region,
            } = *test;
            Expr::Test(Box::new(Test {
                target: optimize(target),
                name,
                args: optimize_args(args),
                region,
            }))
        }
        Expr::Call(call) => {
            let Call {
                callee,
                args,
                region,
            } = *call;
            Expr::Call(Box::new(Call {
                callee,
                args: optimize_args(args),
                region,
            }))
        }
        Expr::Getattr(attr) => {
            let Getattr {
                target,
                attr,
                ctx,
                region,
            } = *attr;
            Expr::Getattr(Box::new(Getattr {
                target: optimize(target),
                attr,
                ctx,
                region,
            }))
        }
        Expr::Getitem(item) => {
            let Getitem {
                target,
                key,
                ctx,
                region,
            } = *item;
            Expr::Getitem(Box::new(Getitem {
                target: optimize(target),
                key: optimize(key),
                ctx,
                region,
            }))
        }
        Expr::MarkSafe(inner, region) => Expr::MarkSafe(Box::new(optimize(*inner)), region),
        expr => expr,
    }
}

fn optimize_args(args: Args) -> Args {
    Args {
        positional: args.positional.into_iter().map(optimize).collect(),
        named: args
            .named
            .into_iter()
            .map(|mut keyword| {
                keyword.value = optimize(keyword.value);
                keyword
            })
            .collect(),
        spread: args.spread.map(optimize),
        spread_named: args.spread_named.map(optimize),
    }
}
