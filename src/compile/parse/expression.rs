use super::{
    tree::{
        Args, BinExpr, BinOp, Call, Compare, CompareOp, Concat, CondExpr, Const, Dict, Expr,
        Filter, Getattr, Getitem, Keyword, List, Name, NsRef, Operand, Pair, Param, Params,
        SetCtx, Slice, Test, Tuple, UnaryExpr, UnaryOp,
    },
    visit::set_ctx,
    Parser,
};
use crate::{
    compile::{token::Token, Operator},
    log::{Error, INVALID_SYNTAX},
    region::Region,
    render::Value,
    security::grow_stack,
};
use std::{num::IntErrorKind, str::Chars};

impl<'source> Parser<'source> {
    /// Parse an expression, including conditional expressions.
    pub(super) fn parse_expression(&mut self) -> Result<Expr, Error> {
        self.parse_condexpr()
    }

    /// Parse `a if b else c`, where the `else` branch may chain.
    fn parse_condexpr(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_or()?;
        while self.skip_name("if")?.is_some() {
            let test = self.parse_or()?;
            let otherwise = match self.skip_name("else")? {
                Some(_) => Some(self.parse_condexpr()?),
                None => None,
            };
            let end = otherwise.as_ref().map_or(test.region(), Expr::region);
            let region = expr.region().combine(end);
            expr = Expr::Cond(Box::new(CondExpr {
                test,
                then: expr,
                otherwise,
                region,
            }));
        }

        Ok(expr)
    }

    pub(super) fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.skip_name("or")?.is_some() {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_not()?;
        while self.skip_name("and")?.is_some() {
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, Error> {
        if let Some(region) = self.skip_name("not")? {
            let operand = self.parse_not()?;
            return Ok(unary(UnaryOp::Not, operand, region));
        }

        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, Error> {
        let first = self.parse_math1()?;
        let mut ops = vec![];
        loop {
            let op = match self.peek()? {
                Some((Token::Operator(operator), _)) => match compare_operator(operator) {
                    Some(op) => op,
                    None => break,
                },
                Some((Token::Name, region)) => match self.text(region) {
                    "in" => CompareOp::In,
                    "not" if self.nth_is_name(1, "in")? => {
                        self.next()?;
                        CompareOp::NotIn
                    }
                    _ => break,
                },
                _ => break,
            };
            let (_, region) = self.next_any_must()?;
            let expr = self.parse_math1()?;
            ops.push(Operand {
                op,
                region: region.combine(expr.region()),
                expr,
            });
        }

        let Some(last) = ops.last() else {
            return Ok(first);
        };
        let region = first.region().combine(last.region);

        Ok(Expr::Compare(Box::new(Compare { first, ops, region })))
    }

    fn parse_math1(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek_operator()? {
                Some(Operator::Add) => BinOp::Add,
                Some(Operator::Subtract) => BinOp::Sub,
                _ => break,
            };
            self.next()?;
            let right = self.parse_concat()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expr, Error> {
        let mut items = vec![self.parse_math2()?];
        while self.skip_if(Token::Operator(Operator::Tilde))?.is_some() {
            items.push(self.parse_math2()?);
        }
        if items.len() == 1 {
            return Ok(items.remove(0));
        }

        let region = items[0].region().combine(items[items.len() - 1].region());
        Ok(Expr::Concat(Concat { items, region }))
    }

    fn parse_math2(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.peek_operator()? {
                Some(Operator::Multiply) => BinOp::Mul,
                Some(Operator::Divide) => BinOp::Div,
                Some(Operator::FloorDivide) => BinOp::FloorDiv,
                Some(Operator::Modulo) => BinOp::Mod,
                _ => break,
            };
            self.next()?;
            let right = self.parse_pow()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse `a ** b`, which groups to the right.
    fn parse_pow(&mut self) -> Result<Expr, Error> {
        let left = self.parse_unary(true)?;
        if self.skip_if(Token::Operator(Operator::Power))?.is_some() {
            let right = self.parse_pow()?;
            return Ok(binary(BinOp::Pow, left, right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self, with_filter: bool) -> Result<Expr, Error> {
        grow_stack(|| self.parse_unary_inner(with_filter))
    }

    fn parse_unary_inner(&mut self, with_filter: bool) -> Result<Expr, Error> {
        let expr = match self.peek()? {
            Some((Token::Operator(Operator::Subtract), region)) => {
                self.next()?;
                let operand = self.parse_unary(false)?;
                unary(UnaryOp::Neg, operand, region)
            }
            Some((Token::Operator(Operator::Add), region)) => {
                self.next()?;
                let operand = self.parse_unary(false)?;
                unary(UnaryOp::Pos, operand, region)
            }
            Some((Token::Name, region))
                if self.text(region) == "await" && self.starts_primary(1)? =>
            {
                if !self.options.enable_async {
                    return Err(self
                        .error("`await` is only allowed in async templates", region)
                        .with_help("set `enable_async` on the engine to use `await`"));
                }
                self.next()?;
                let operand = self.parse_unary(false)?;
                Expr::Await(Box::new(super::tree::Await {
                    region: region.combine(operand.region()),
                    operand,
                }))
            }
            _ => self.parse_primary()?,
        };

        let expr = self.parse_postfix(expr)?;
        match with_filter {
            true => self.parse_filter_expr(expr),
            false => Ok(expr),
        }
    }

    pub(super) fn parse_primary(&mut self) -> Result<Expr, Error> {
        let (token, region) = self.next_any_must()?;
        match token {
            Token::Name => {
                let name = self.text(region);
                let value = match name {
                    "true" | "True" => Value::Bool(true),
                    "false" | "False" => Value::Bool(false),
                    "none" | "None" => Value::None,
                    _ => {
                        return Ok(Expr::Name(Name {
                            name: name.to_string(),
                            ctx: SetCtx::Load,
                            region,
                        }))
                    }
                };
                Ok(constant(value, region))
            }
            Token::String => {
                let mut text = self.parse_string(region)?;
                let mut full = region;
                while let Some((Token::String, next)) = self.peek()? {
                    self.next()?;
                    text.push_str(&self.parse_string(next)?);
                    full = full.combine(next);
                }
                Ok(constant(Value::from(text), full))
            }
            Token::Integer => Ok(constant(Value::Int(self.parse_integer(region)?), region)),
            Token::Float => Ok(constant(Value::Float(self.parse_float(region)?), region)),
            Token::Operator(Operator::LeftParen) => {
                let expr = self.parse_tuple(false, true, &[], true)?;
                let end = self.next_must_operator(Operator::RightParen)?;
                Ok(match expr {
                    Expr::Tuple(mut tuple) => {
                        tuple.region = region.combine(end);
                        Expr::Tuple(tuple)
                    }
                    expr => expr,
                })
            }
            Token::Operator(Operator::LeftBracket) => self.parse_list(region),
            Token::Operator(Operator::LeftBrace) => self.parse_dict(region),
            token => Err(self.unexpected(token, region, "an expression")),
        }
    }

    /// Parse a comma separated sequence of expressions.
    ///
    /// A single expression is returned as is, unless a comma follows it.
    /// With `explicit_parentheses`, `()` is accepted as an empty tuple.
    /// `simplified` restricts items to primary expressions, for use in
    /// assignment targets.
    pub(super) fn parse_tuple(
        &mut self,
        simplified: bool,
        with_condexpr: bool,
        extra_end_rules: &[&str],
        explicit_parentheses: bool,
    ) -> Result<Expr, Error> {
        let mut items = vec![];
        let mut is_tuple = false;
        loop {
            if !items.is_empty() {
                self.next_must_operator(Operator::Comma)?;
            }
            if self.is_tuple_end(extra_end_rules)? {
                break;
            }
            let item = match (simplified, with_condexpr) {
                (true, _) => self.parse_primary()?,
                (false, true) => self.parse_expression()?,
                (false, false) => self.parse_or()?,
            };
            items.push(item);
            match self.next_is_operator(Operator::Comma)? {
                true => is_tuple = true,
                false => break,
            }
        }

        if !is_tuple {
            if let Some(item) = items.pop() {
                return Ok(item);
            }
            if !explicit_parentheses {
                return Err(match self.peek()? {
                    Some((token, region)) => self.unexpected(token, region, "an expression"),
                    None => self.error_eof_expecting("an expression"),
                });
            }
        }

        let region = match (items.first(), items.last()) {
            (Some(first), Some(last)) => first.region().combine(last.region()),
            _ => self.peek_region()?,
        };
        Ok(Expr::Tuple(Tuple {
            items,
            ctx: SetCtx::Load,
            region,
        }))
    }

    fn is_tuple_end(&mut self, extra_end_rules: &[&str]) -> Result<bool, Error> {
        Ok(match self.peek()? {
            None => true,
            Some((
                Token::VariableEnd
                | Token::BlockEnd
                | Token::LineStatementEnd
                | Token::Operator(Operator::RightParen),
                _,
            )) => true,
            Some((Token::Name, region)) => extra_end_rules.contains(&self.text(region)),
            _ => false,
        })
    }

    fn parse_list(&mut self, begin: Region) -> Result<Expr, Error> {
        let mut items = vec![];
        loop {
            if self.next_is_operator(Operator::RightBracket)? {
                break;
            }
            if !items.is_empty() {
                self.next_must_operator(Operator::Comma)?;
                if self.next_is_operator(Operator::RightBracket)? {
                    break;
                }
            }
            items.push(self.parse_expression()?);
        }
        let end = self.next_must_operator(Operator::RightBracket)?;

        Ok(Expr::List(List {
            items,
            region: begin.combine(end),
        }))
    }

    fn parse_dict(&mut self, begin: Region) -> Result<Expr, Error> {
        let mut pairs: Vec<Pair> = vec![];
        loop {
            if self.next_is_operator(Operator::RightBrace)? {
                break;
            }
            if !pairs.is_empty() {
                self.next_must_operator(Operator::Comma)?;
                if self.next_is_operator(Operator::RightBrace)? {
                    break;
                }
            }
            let key = self.parse_expression()?;
            self.next_must_operator(Operator::Colon)?;
            let value = self.parse_expression()?;
            pairs.push(Pair {
                region: key.region().combine(value.region()),
                key,
                value,
            });
        }
        let end = self.next_must_operator(Operator::RightBrace)?;

        Ok(Expr::Dict(Dict {
            pairs,
            region: begin.combine(end),
        }))
    }

    /// Apply attribute access, subscripts and calls.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, Error> {
        loop {
            expr = match self.peek_operator()? {
                Some(Operator::Period | Operator::LeftBracket) => self.parse_subscript(expr)?,
                Some(Operator::LeftParen) => self.parse_call(expr)?,
                _ => return Ok(expr),
            };
        }
    }

    /// Apply filters, tests and calls, in the order they appear.
    fn parse_filter_expr(&mut self, mut expr: Expr) -> Result<Expr, Error> {
        loop {
            expr = match self.peek()? {
                Some((Token::Operator(Operator::Pipe), _)) => {
                    self.next()?;
                    Expr::Filter(Box::new(self.parse_filter_call(Some(expr))?))
                }
                Some((Token::Name, region)) if self.text(region) == "is" => {
                    self.parse_test(expr)?
                }
                Some((Token::Operator(Operator::LeftParen), _)) => self.parse_call(expr)?,
                _ => return Ok(expr),
            };
        }
    }

    fn parse_subscript(&mut self, target: Expr) -> Result<Expr, Error> {
        let (token, begin) = self.next_any_must()?;
        if token == Token::Operator(Operator::Period) {
            let (token, region) = self.next_any_must()?;
            let full = target.region().combine(region);
            return match token {
                Token::Name => Ok(Expr::Getattr(Box::new(Getattr {
                    target,
                    attr: self.text(region).to_string(),
                    ctx: SetCtx::Load,
                    region: full,
                }))),
                Token::Integer => {
                    let key = constant(Value::Int(self.parse_integer(region)?), region);
                    Ok(Expr::Getitem(Box::new(Getitem {
                        target,
                        key,
                        ctx: SetCtx::Load,
                        region: full,
                    })))
                }
                token => Err(self.unexpected(token, region, "name or number")),
            };
        }

        let mut keys = vec![];
        loop {
            if self.next_is_operator(Operator::RightBracket)? {
                break;
            }
            if !keys.is_empty() {
                self.next_must_operator(Operator::Comma)?;
                if self.next_is_operator(Operator::RightBracket)? {
                    break;
                }
            }
            keys.push(self.parse_subscribed()?);
        }
        let end = self.next_must_operator(Operator::RightBracket)?;

        let key = match keys.len() {
            1 => keys.remove(0),
            _ => Expr::Tuple(Tuple {
                items: keys,
                ctx: SetCtx::Load,
                region: begin.combine(end),
            }),
        };
        Ok(Expr::Getitem(Box::new(Getitem {
            region: target.region().combine(end),
            target,
            key,
            ctx: SetCtx::Load,
        })))
    }

    /// Parse one item of a subscript, which may be a slice.
    fn parse_subscribed(&mut self) -> Result<Expr, Error> {
        let begin = self.peek_region()?;
        let start = match self.next_is_operator(Operator::Colon)? {
            true => None,
            false => {
                let expr = self.parse_expression()?;
                if !self.next_is_operator(Operator::Colon)? {
                    return Ok(expr);
                }
                Some(expr)
            }
        };

        let mut end = self.next_must_operator(Operator::Colon)?;
        let stop = match self.peek_operator()? {
            Some(Operator::Colon | Operator::RightBracket | Operator::Comma) => None,
            _ => Some(self.parse_expression()?),
        };
        if let Some(stop) = &stop {
            end = end.combine(stop.region());
        }
        let step = match self.skip_if(Token::Operator(Operator::Colon))? {
            Some(colon) => {
                end = end.combine(colon);
                match self.peek_operator()? {
                    Some(Operator::RightBracket | Operator::Comma) => None,
                    _ => Some(self.parse_expression()?),
                }
            }
            None => None,
        };
        if let Some(step) = &step {
            end = end.combine(step.region());
        }

        Ok(Expr::Slice(Box::new(Slice {
            start,
            stop,
            step,
            region: begin.combine(end),
        })))
    }

    fn parse_call(&mut self, callee: Expr) -> Result<Expr, Error> {
        let (args, end) = self.parse_call_args()?;
        let region = callee.region().combine(end);

        Ok(Expr::Call(Box::new(Call {
            callee,
            args,
            region,
        })))
    }

    /// Parse `(a, b, name=c, *d, **e)`.
    ///
    /// Positional arguments may not follow named arguments or spreads.
    fn parse_call_args(&mut self) -> Result<(Args, Region), Error> {
        let begin = self.next_must_operator(Operator::LeftParen)?;
        let mut args = Args::default();
        let mut require_comma = false;
        loop {
            if self.next_is_operator(Operator::RightParen)? {
                break;
            }
            if require_comma {
                self.next_must_operator(Operator::Comma)?;
                if self.next_is_operator(Operator::RightParen)? {
                    break;
                }
            }

            match self.peek()? {
                Some((Token::Operator(Operator::Multiply), region)) => {
                    if args.spread.is_some() || args.spread_named.is_some() {
                        return Err(self.invalid_call(region));
                    }
                    self.next()?;
                    args.spread = Some(self.parse_expression()?);
                }
                Some((Token::Operator(Operator::Power), region)) => {
                    if args.spread_named.is_some() {
                        return Err(self.invalid_call(region));
                    }
                    self.next()?;
                    args.spread_named = Some(self.parse_expression()?);
                }
                Some((Token::Name, region))
                    if self
                        .peek_nth(1)?
                        .is_some_and(|(t, _)| t == Token::Operator(Operator::Assign)) =>
                {
                    if args.spread_named.is_some() {
                        return Err(self.invalid_call(region));
                    }
                    self.next()?;
                    self.next()?;
                    let value = self.parse_expression()?;
                    args.named.push(Keyword {
                        name: self.text(region).to_string(),
                        region: region.combine(value.region()),
                        value,
                    });
                }
                _ => {
                    let region = self.peek_region()?;
                    if args.spread.is_some()
                        || args.spread_named.is_some()
                        || !args.named.is_empty()
                    {
                        return Err(self.invalid_call(region));
                    }
                    args.positional.push(self.parse_expression()?);
                }
            }
            require_comma = true;
        }
        let end = self.next_must_operator(Operator::RightParen)?;

        Ok((args, begin.combine(end)))
    }

    /// Parse `name[.name][(args)]` after a pipe.
    ///
    /// The target is absent for the filters of `filter` and `set` blocks.
    pub(super) fn parse_filter_call(&mut self, target: Option<Expr>) -> Result<Filter, Error> {
        let (name, mut region) = self.parse_dotted_name()?;
        let mut args = Args::default();
        if self.next_is_operator(Operator::LeftParen)? {
            let (call_args, end) = self.parse_call_args()?;
            args = call_args;
            region = region.combine(end);
        }
        if let Some(target) = &target {
            region = target.region().combine(region);
        }

        Ok(Filter {
            target,
            name,
            args,
            region,
        })
    }

    /// Parse `a|b(c)|d` without a target, as used by block statements.
    pub(super) fn parse_filter_chain(&mut self) -> Result<Vec<Filter>, Error> {
        let mut filters = vec![self.parse_filter_call(None)?];
        while self.skip_if(Token::Operator(Operator::Pipe))?.is_some() {
            filters.push(self.parse_filter_call(None)?);
        }

        Ok(filters)
    }

    /// Parse `is [not] name`, with arguments in parentheses or a single
    /// argument without them.
    fn parse_test(&mut self, target: Expr) -> Result<Expr, Error> {
        let is = self.next_must_name("is")?;
        let negated = self.skip_name("not")?.is_some();
        let (name, mut region) = self.parse_dotted_name()?;

        let mut args = Args::default();
        match self.peek()? {
            Some((Token::Operator(Operator::LeftParen), _)) => {
                let (call_args, end) = self.parse_call_args()?;
                args = call_args;
                region = region.combine(end);
            }
            Some((token, next)) if self.starts_primary(0)? => {
                let text = self.text(next);
                if token != Token::Name || !matches!(text, "else" | "or" | "and" | "if") {
                    if token == Token::Name && text == "is" {
                        return Err(self
                            .error("cannot chain multiple tests with `is`", next)
                            .with_help("combine the tests with `and` instead"));
                    }
                    let argument = self.parse_primary()?;
                    let argument = self.parse_postfix(argument)?;
                    region = region.combine(argument.region());
                    args.positional.push(argument);
                }
            }
            _ => {}
        }

        let region = target.region().combine(region);
        let test = Expr::Test(Box::new(Test {
            target,
            name,
            args,
            region,
        }));
        Ok(match negated {
            true => unary(UnaryOp::Not, test, is),
            false => test,
        })
    }

    fn parse_dotted_name(&mut self) -> Result<(String, Region), Error> {
        let (mut name, mut region) = self.parse_identifier()?;
        while self.skip_if(Token::Operator(Operator::Period))?.is_some() {
            let (part, end) = self.parse_identifier()?;
            name.push('.');
            name.push_str(&part);
            region = region.combine(end);
        }

        Ok((name, region))
    }

    /// Parse the target of an assignment, a loop or a `with` binding.
    ///
    /// With `with_namespace`, `ns.attr` is accepted and produces an
    /// [`NsRef`].
    pub(super) fn parse_assign_target(
        &mut self,
        with_tuple: bool,
        name_only: bool,
        extra_end_rules: &[&str],
        with_namespace: bool,
    ) -> Result<Expr, Error> {
        let is_namespace_ref = with_namespace
            && self
                .peek_nth(1)?
                .is_some_and(|(t, _)| t == Token::Operator(Operator::Period));

        let mut target = if is_namespace_ref {
            let (name, begin) = self.parse_identifier()?;
            self.next()?;
            let (attr, end) = self.parse_identifier()?;
            return Ok(Expr::NsRef(NsRef {
                name,
                attr,
                region: begin.combine(end),
            }));
        } else if name_only {
            let (name, region) = self.parse_identifier()?;
            Expr::Name(Name {
                name,
                ctx: SetCtx::Store,
                region,
            })
        } else if with_tuple {
            self.parse_tuple(true, true, extra_end_rules, false)?
        } else {
            self.parse_primary()?
        };

        set_ctx(&mut target, SetCtx::Store);
        if !can_assign(&target) {
            return Err(self.error(
                format!("can't assign to {}", describe_target(&target)),
                target.region(),
            ));
        }

        Ok(target)
    }

    /// Parse the parameters of a macro or call block.
    ///
    /// Parameters appear in the order positional, keyword-only, `*args`
    /// and `**kwargs`. A bare `*` or `*args` ends the positional section.
    pub(super) fn parse_signature(&mut self) -> Result<Params, Error> {
        let mut params = Params::default();
        let mut keyword_only = false;
        let mut first = true;

        self.next_must_operator(Operator::LeftParen)?;
        loop {
            if self.next_is_operator(Operator::RightParen)? {
                break;
            }
            if !first {
                self.next_must_operator(Operator::Comma)?;
                if self.next_is_operator(Operator::RightParen)? {
                    break;
                }
            }
            first = false;

            let region = self.peek_region()?;
            if params.kwargs.is_some() {
                return Err(self.assertion("parameter follows `**kwargs`", region));
            }

            match self.peek_operator()? {
                Some(Operator::Power) => {
                    self.next()?;
                    let (name, region) = self.parse_identifier()?;
                    self.declare(&params, &name, region)?;
                    params.kwargs = Some(name);
                }
                Some(Operator::Multiply) => {
                    self.next()?;
                    if self.next_is(Token::Name)? {
                        let (name, region) = self.parse_identifier()?;
                        if params.varargs.is_some() {
                            return Err(self.assertion("duplicate `*args` parameter", region));
                        }
                        self.declare(&params, &name, region)?;
                        params.varargs = Some(name);
                    } else if keyword_only {
                        return Err(self.assertion("duplicate `*` marker", region));
                    }
                    keyword_only = true;
                }
                _ => {
                    let (name, region) = self.parse_identifier()?;
                    self.declare(&params, &name, region)?;
                    let default = match self.skip_if(Token::Operator(Operator::Assign))? {
                        Some(_) => Some(self.parse_expression()?),
                        None => None,
                    };

                    let param = Param {
                        name,
                        default,
                        region,
                    };
                    if keyword_only {
                        params.keyword_only.push(param);
                        continue;
                    }
                    let follows_default = params
                        .positional
                        .last()
                        .is_some_and(|p| p.default.is_some());
                    if param.default.is_none() && follows_default {
                        return Err(self
                            .assertion("non-default argument follows default argument", region));
                    }
                    params.positional.push(param);
                }
            }
        }
        self.next_must_operator(Operator::RightParen)?;

        Ok(params)
    }

    fn declare(&self, params: &Params, name: &str, region: Region) -> Result<(), Error> {
        if params.declares(name) {
            return Err(self.assertion(format!("duplicate parameter `{name}`"), region));
        }

        Ok(())
    }

    /// Decode the literal value of a string token.
    pub(super) fn parse_string(&self, region: Region) -> Result<String, Error> {
        let literal = self.text(region);
        let inner = literal
            .get(1..literal.len().saturating_sub(1))
            .unwrap_or_default();

        unescape(inner).map_err(|reason| self.error(reason, region))
    }

    fn parse_integer(&self, region: Region) -> Result<i64, Error> {
        let text = self.text(region).replace('_', "");
        let (digits, radix) = match text.get(..2) {
            Some("0b" | "0B") => (&text[2..], 2),
            Some("0o" | "0O") => (&text[2..], 8),
            Some("0x" | "0X") => (&text[2..], 16),
            _ => (text.as_str(), 10),
        };

        i64::from_str_radix(digits, radix).map_err(|error| match error.kind() {
            IntErrorKind::PosOverflow => self
                .error("integer literal is too large", region)
                .with_help(format!("integers must be at most {}", i64::MAX)),
            _ => self.error(format!("invalid integer literal `{text}`"), region),
        })
    }

    fn parse_float(&self, region: Region) -> Result<f64, Error> {
        let text = self.text(region).replace('_', "");

        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid float literal `{text}`"), region))
    }

    /// Return the upcoming token if it is an operator.
    fn peek_operator(&mut self) -> Result<Option<Operator>, Error> {
        Ok(match self.peek()? {
            Some((Token::Operator(operator), _)) => Some(operator),
            _ => None,
        })
    }

    /// Return the region of the upcoming token, or the end of source.
    pub(super) fn peek_region(&mut self) -> Result<Region, Error> {
        Ok(match self.peek()? {
            Some((_, region)) => region,
            None => self.eof_region(),
        })
    }

    /// Return true if the token `n` places ahead may begin a primary
    /// expression.
    fn starts_primary(&mut self, n: usize) -> Result<bool, Error> {
        Ok(matches!(
            self.peek_nth(n)?,
            Some((
                Token::Name
                    | Token::String
                    | Token::Integer
                    | Token::Float
                    | Token::Operator(
                        Operator::LeftParen | Operator::LeftBracket | Operator::LeftBrace
                    ),
                _
            ))
        ))
    }

    fn invalid_call(&self, region: Region) -> Error {
        self.error(INVALID_SYNTAX, region).with_help(
            "positional arguments must come before named arguments, `*args` and `**kwargs`",
        )
    }
}

#[inline]
fn constant(value: Value, region: Region) -> Expr {
    Expr::Const(Const { value, region })
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let region = left.region().combine(right.region());

    Expr::Bin(Box::new(BinExpr {
        op,
        left,
        right,
        region,
    }))
}

fn unary(op: UnaryOp, operand: Expr, region: Region) -> Expr {
    let region = region.combine(operand.region());

    Expr::Unary(Box::new(UnaryExpr {
        op,
        operand,
        region,
    }))
}

fn compare_operator(operator: Operator) -> Option<CompareOp> {
    let op = match operator {
        Operator::Equal => CompareOp::Eq,
        Operator::NotEqual => CompareOp::Ne,
        Operator::Greater => CompareOp::Gt,
        Operator::GreaterOrEqual => CompareOp::Ge,
        Operator::Lesser => CompareOp::Lt,
        Operator::LesserOrEqual => CompareOp::Le,
        _ => return None,
    };

    Some(op)
}

fn can_assign(expr: &Expr) -> bool {
    match expr {
        Expr::Name(name) => !matches!(
            name.name.as_str(),
            "true" | "false" | "none" | "True" | "False" | "None"
        ),
        Expr::Tuple(tuple) => tuple.items.iter().all(can_assign),
        Expr::NsRef(_) => true,
        _ => false,
    }
}

fn describe_target(expr: &Expr) -> &'static str {
    match expr {
        Expr::Const(_) => "a literal",
        Expr::List(_) | Expr::Dict(_) => "a literal",
        Expr::Call(_) => "a function call",
        Expr::Getattr(_) | Expr::Getitem(_) => "an attribute or item",
        _ => "an expression",
    }
}

/// Decode backslash escapes.
///
/// Unknown escapes are kept as written, backslash included.
fn unescape(text: &str) -> Result<String, String> {
    if !text.contains('\\') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => out.push(unescape_hex(&mut chars, 2, escape)?),
            'u' => out.push(unescape_hex(&mut chars, 4, escape)?),
            'U' => out.push(unescape_hex(&mut chars, 8, escape)?),
            '\n' => {}
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

fn unescape_hex(chars: &mut Chars, len: usize, escape: char) -> Result<char, String> {
    let digits: String = chars.by_ref().take(len).collect();
    let invalid = || format!("invalid escape sequence `\\{escape}{digits}`");
    if digits.len() != len || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::unescape;
    use crate::{
        compile::{
            tree::{BinOp, CompareOp, Expr, Stmt, UnaryOp},
            Options, Parser,
        },
        log::ErrorKind,
        render::Value,
    };

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb").unwrap(), "a\nb");
        assert_eq!(unescape(r"\x41é").unwrap(), "Aé");
        assert_eq!(unescape(r"\d").unwrap(), r"\d");
        assert!(unescape(r"\xZZ").is_err());
    }

    #[test]
    fn test_pow_groups_right() {
        let Expr::Bin(pow) = expr("2 ** 3 ** 2") else {
            panic!("expected binary expression");
        };

        assert_eq!(pow.op, BinOp::Pow);
        assert!(matches!(&pow.left, Expr::Const(_)));
        assert!(matches!(&pow.right, Expr::Bin(b) if b.op == BinOp::Pow));
    }

    #[test]
    fn test_concat_binds_looser_than_multiply() {
        let Expr::Concat(concat) = expr("a ~ b * c ~ d") else {
            panic!("expected concat");
        };

        assert_eq!(concat.items.len(), 3);
        assert!(matches!(&concat.items[1], Expr::Bin(b) if b.op == BinOp::Mul));
    }

    #[test]
    fn test_chained_compare() {
        let Expr::Compare(compare) = expr("1 < x <= 3") else {
            panic!("expected compare");
        };
        let ops = compare.ops.iter().map(|o| o.op).collect::<Vec<_>>();

        assert_eq!(ops, vec![CompareOp::Lt, CompareOp::Le]);
    }

    #[test]
    fn test_not_in() {
        let Expr::Compare(compare) = expr("a not in b") else {
            panic!("expected compare");
        };

        assert_eq!(compare.ops[0].op, CompareOp::NotIn);
    }

    #[test]
    fn test_condexpr_chains() {
        let Expr::Cond(cond) = expr("a if b else c if d else e") else {
            panic!("expected conditional");
        };

        assert!(matches!(&cond.otherwise, Some(Expr::Cond(_))));
    }

    #[test]
    fn test_filter_with_arguments() {
        let Expr::Filter(filter) = expr("name|default('x')|upper") else {
            panic!("expected filter");
        };

        assert_eq!(filter.name, "upper");
        let Some(Expr::Filter(inner)) = &filter.target else {
            panic!("expected inner filter");
        };
        assert_eq!(inner.name, "default");
        assert_eq!(inner.args.positional.len(), 1);
    }

    #[test]
    fn test_negated_test_without_parentheses() {
        let Expr::Unary(not) = expr("x is not divisibleby 3") else {
            panic!("expected negation");
        };
        let Expr::Test(test) = &not.operand else {
            panic!("expected test");
        };

        assert_eq!(not.op, UnaryOp::Not);
        assert_eq!(test.name, "divisibleby");
        assert_eq!(test.args.positional.len(), 1);
    }

    #[test]
    fn test_test_before_else() {
        assert!(matches!(expr("1 if x is defined else 2"), Expr::Cond(_)));
    }

    #[test]
    fn test_call_arguments() {
        let Expr::Call(call) = expr("f(1, b=2, *c, **d)") else {
            panic!("expected call");
        };

        assert_eq!(call.args.positional.len(), 1);
        assert_eq!(call.args.named[0].name, "b");
        assert!(call.args.spread.is_some());
        assert!(call.args.spread_named.is_some());
    }

    #[test]
    fn test_positional_after_keyword() {
        let options = Options::default();
        let error = Parser::expression("f(a=1, 2)", &options)
            .parse_standalone()
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_slice() {
        let Expr::Getitem(getitem) = expr("items[1::2]") else {
            panic!("expected subscript");
        };
        let Expr::Slice(slice) = &getitem.key else {
            panic!("expected slice");
        };

        assert!(slice.start.is_some());
        assert!(slice.stop.is_none());
        assert!(slice.step.is_some());
    }

    #[test]
    fn test_dotted_number_subscript() {
        let Expr::Getitem(getitem) = expr("items.0") else {
            panic!("expected subscript");
        };

        assert!(matches!(&getitem.key, Expr::Const(c) if matches!(c.value, Value::Int(0))));
    }

    #[test]
    fn test_tuples() {
        assert!(matches!(expr("(1,)"), Expr::Tuple(t) if t.items.len() == 1));
        assert!(matches!(expr("()"), Expr::Tuple(t) if t.items.is_empty()));
        assert!(matches!(expr("(1)"), Expr::Const(_)));
        assert!(matches!(expr("1, 2"), Expr::Tuple(t) if t.items.len() == 2));
    }

    #[test]
    fn test_adjacent_strings() {
        let Expr::Const(c) = expr("'a' \"b\"") else {
            panic!("expected constant");
        };

        assert!(matches!(&c.value, Value::String(s) if &**s == "ab"));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(expr("None"), Expr::Const(c) if matches!(c.value, Value::None)));
        assert!(matches!(expr("0x1F"), Expr::Const(c) if matches!(c.value, Value::Int(31))));
        assert!(matches!(expr("1_000"), Expr::Const(c) if matches!(c.value, Value::Int(1000))));
        assert!(matches!(expr("[1, 2,]"), Expr::List(l) if l.items.len() == 2));
        assert!(matches!(expr("{'a': 1}"), Expr::Dict(d) if d.pairs.len() == 1));
    }

    #[test]
    fn test_integer_overflow() {
        let options = Options::default();
        let error = Parser::expression("99999999999999999999", &options)
            .parse_standalone()
            .unwrap_err();

        assert!(error.reason().contains("too large"));
    }

    #[test]
    fn test_await_requires_async() {
        let options = Options::default();
        let error = Parser::expression("await x", &options)
            .parse_standalone()
            .unwrap_err();
        assert!(error.help().unwrap_or_default().contains("enable_async"));

        let options = Options {
            enable_async: true,
            ..Options::default()
        };
        let expr = Parser::expression("await x", &options).parse_standalone();
        assert!(matches!(expr, Ok(Expr::Await(_))));
    }

    #[test]
    fn test_signature() {
        let body = parse("{% macro m(a, b=1, *, c, d=2, *rest, **named) %}{% endmacro %}");
        let Stmt::Macro(m) = &body[0] else {
            panic!("expected macro");
        };

        assert_eq!(m.params.positional.len(), 2);
        assert_eq!(m.params.keyword_only.len(), 2);
        assert_eq!(m.params.varargs.as_deref(), Some("rest"));
        assert_eq!(m.params.kwargs.as_deref(), Some("named"));
    }

    #[test]
    fn test_signature_default_order() {
        let options = Options::default();
        let error = Parser::new("{% macro m(a=1, b) %}{% endmacro %}", &options)
            .parse()
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Assertion);
        assert!(error.reason().contains("non-default argument"));
    }

    #[test]
    fn test_signature_duplicate() {
        let options = Options::default();
        let error = Parser::new("{% macro m(a, a) %}{% endmacro %}", &options)
            .parse()
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn test_assign_to_literal() {
        let options = Options::default();
        let error = Parser::new("{% set true = 1 %}", &options)
            .parse()
            .unwrap_err();

        assert!(error.reason().contains("can't assign"));
    }

    fn expr(source: &str) -> Expr {
        let options = Options::default();
        Parser::expression(source, &options)
            .parse_standalone()
            .unwrap()
    }

    fn parse(source: &str) -> Vec<Stmt> {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap().body
    }
}
