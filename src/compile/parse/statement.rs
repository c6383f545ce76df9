use super::{
    constant::{as_const, EvalContext},
    tree::{
        Assign, AssignBlock, Autoescape, Block, CallBlock, Data, Do, Export, Expr, Extends,
        FilterBlock, For, FromImport, If, Import, Include, Macro, NamespaceBlock, Output, Params,
        Scope, SetCtx, Spaceless, Stmt, Trans, With,
    },
    visit::{set_ctx, NameFinder},
    Parser,
};
use crate::{
    compile::{token::Token, Keyword, Operator},
    log::Error,
    region::Region,
    render::Value,
};
use std::sync::Arc;

/// Names a macro body may use without declaring them.
const IMPLICIT_NAMES: [&str; 3] = ["caller", "varargs", "kwargs"];

impl<'source> Parser<'source> {
    /// Parse the statement inside of a block tag, leaving the end of the tag
    /// in the stream.
    ///
    /// `begin` is the region of the tag opener.
    pub(super) fn parse_statement(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (token, region) = self.next_any_must()?;
        if token != Token::Name {
            return Err(self.unexpected(token, region, "a tag name"));
        }
        let name = self.text(region);
        let Some(keyword) = Keyword::from_name(name) else {
            return Err(self.error_unknown_tag(name, region));
        };
        log::trace!("parsing `{keyword}` statement at {}", region.position);

        match keyword {
            Keyword::If => self.parse_if(begin),
            Keyword::For => self.parse_for(begin, false),
            Keyword::Block => self.parse_block(begin),
            Keyword::Extends => self.parse_extends(begin),
            Keyword::Print => self.parse_print(begin),
            Keyword::Macro => self.parse_macro(begin),
            Keyword::Include => self.parse_include(begin),
            Keyword::From => self.parse_from(begin),
            Keyword::Import => self.parse_import(begin),
            Keyword::Set => self.parse_set(begin),
            Keyword::With => self.parse_with(begin, false),
            Keyword::Autoescape => self.parse_autoescape(begin),
            Keyword::Filter => self.parse_filter_block(begin),
            Keyword::Call => self.parse_call_block(begin),
            Keyword::Trans => self.parse_trans(begin, "trans", "endtrans"),
            Keyword::Blocktrans => self.parse_trans(begin, "blocktrans", "endblocktrans"),
            Keyword::Do => self.parse_do(begin),
            Keyword::Break | Keyword::Continue => self.parse_loop_control(begin, keyword, region),
            Keyword::Spaceless => self.parse_spaceless(begin),
            Keyword::Namespace => self.parse_namespace(begin),
            Keyword::Export => self.parse_export(begin),
            Keyword::Scope => self.parse_scope(begin),
            Keyword::Raw => self.parse_raw(begin, "endraw"),
            Keyword::Verbatim => self.parse_raw(begin, "endverbatim"),
            Keyword::Async => self.parse_async(begin, region),
        }
    }

    /// Return the region from `begin` up to the end of the current tag.
    fn statement_region(&mut self, begin: Region) -> Result<Region, Error> {
        Ok(begin.combine(self.peek_region()?))
    }

    fn parse_if(&mut self, begin: Region) -> Result<Stmt, Error> {
        let mut branches = vec![];
        let mut otherwise = None;
        let mut test = self.parse_tuple(false, false, &[], false)?;
        loop {
            let (body, needle) = self.parse_statements("if", &["elif", "else", "endif"], true)?;
            branches.push((test, body));
            match needle.as_str() {
                "elif" => test = self.parse_tuple(false, false, &[], false)?,
                "else" => {
                    otherwise = Some(self.parse_statements("if", &["endif"], true)?.0);
                    break;
                }
                _ => break,
            }
        }

        Ok(Stmt::If(If {
            branches,
            otherwise,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_for(&mut self, begin: Region, is_async: bool) -> Result<Stmt, Error> {
        let target = self.parse_assign_target(true, false, &["in"], false)?;
        self.next_must_name("in")?;
        let iter = self.parse_tuple(false, false, &["recursive"], false)?;
        let filter = match self.skip_name("if")? {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };
        let recursive = self.skip_name("recursive")?.is_some();

        self.loops += 1;
        let result = self.parse_statements("for", &["endfor", "else"], true);
        self.loops -= 1;
        let (body, needle) = result?;
        let otherwise = match needle.as_str() {
            "else" => Some(self.parse_statements("for", &["endfor"], true)?.0),
            _ => None,
        };

        Ok(Stmt::For(Arc::new(For {
            target,
            iter,
            body,
            otherwise,
            filter,
            recursive,
            is_async,
            region: self.statement_region(begin)?,
        })))
    }

    fn parse_block(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (name, name_region) = self.parse_identifier()?;
        if self.next_is_operator(Operator::Subtract)? {
            return Err(self
                .error("block names may not contain `-`", name_region)
                .with_help("use an underscore instead"));
        }
        if self.blocks.contains_key(&name) {
            return Err(self.error(format!("block `{name}` defined twice"), name_region));
        }

        let scoped = self.skip_name("scoped")?.is_some();
        let required = self.skip_name("required")?.is_some();
        let (body, _) = self.parse_statements("block", &["endblock"], true)?;
        self.skip_name(&name)?;

        if required && !is_blank(&body) {
            return Err(self
                .error(format!("required block `{name}` has content"), name_region)
                .with_help("required blocks may only contain whitespace and comments"));
        }

        let block = Arc::new(Block {
            name: name.clone(),
            body,
            scoped,
            required,
            region: self.statement_region(begin)?,
        });
        if self.blocks.insert(name.clone(), block.clone()).is_some() {
            return Err(self.error(format!("block `{name}` defined twice"), name_region));
        }

        Ok(Stmt::Block(block))
    }

    fn parse_extends(&mut self, begin: Region) -> Result<Stmt, Error> {
        let template = self.parse_expression()?;
        let region = self.statement_region(begin)?;
        if self.depth > 0 {
            return Err(self
                .assertion("`extends` is only allowed at the top level", region)
                .with_help("move the tag out of the enclosing block"));
        }
        if self.extends.is_some() {
            return Err(self.assertion("template extends more than one parent", region));
        }

        let name = match as_const(&template, &EvalContext::default()) {
            Ok(Value::String(name)) => name.to_string(),
            _ => {
                return Err(self
                    .error("parent template name must be a constant string", template.region())
                    .with_help("dynamic parent templates are not supported"))
            }
        };
        self.extends = Some((name, template.region()));

        Ok(Stmt::Extends(Extends { template, region }))
    }

    fn parse_print(&mut self, begin: Region) -> Result<Stmt, Error> {
        let mut nodes = vec![];
        while !self.next_is_block_end()? {
            if !nodes.is_empty() {
                self.next_must_operator(Operator::Comma)?;
            }
            nodes.push(self.parse_expression()?);
        }

        Ok(Stmt::Output(Output {
            nodes,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_macro(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (name, _) = self.parse_identifier()?;
        let params = self.parse_signature()?;

        let loops = std::mem::take(&mut self.loops);
        let result = self.parse_statements("macro", &["endmacro"], true);
        self.loops = loops;
        let (body, _) = result?;

        let region = self.statement_region(begin)?;
        let definition = Arc::new(build_macro(name, params, body, region));
        if self.depth == 0 {
            self.macros
                .insert(definition.name.clone(), definition.clone());
        }

        Ok(Stmt::Macro(definition))
    }

    fn parse_call_block(&mut self, begin: Region) -> Result<Stmt, Error> {
        let params = match self.next_is_operator(Operator::LeftParen)? {
            true => self.parse_signature()?,
            false => Params::default(),
        };
        let call = self.parse_expression()?;
        if !matches!(call, Expr::Call(_)) {
            return Err(self
                .error("expected a call", call.region())
                .with_help("`call` must be followed by a macro call, like `{% call m() %}`"));
        }

        let loops = std::mem::take(&mut self.loops);
        let result = self.parse_statements("call", &["endcall"], true);
        self.loops = loops;
        let (body, _) = result?;

        let region = self.statement_region(begin)?;
        let caller = Arc::new(build_macro("caller".to_string(), params, body, region));

        Ok(Stmt::CallBlock(Arc::new(CallBlock {
            call,
            caller,
            region,
        })))
    }

    fn parse_filter_block(&mut self, begin: Region) -> Result<Stmt, Error> {
        let filters = self.parse_filter_chain()?;
        let (body, _) = self.parse_statements("filter", &["endfilter"], true)?;

        Ok(Stmt::FilterBlock(FilterBlock {
            filters,
            body,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_set(&mut self, begin: Region) -> Result<Stmt, Error> {
        let target = self.parse_assign_target(true, false, &[], true)?;
        if self.skip_if(Token::Operator(Operator::Assign))?.is_some() {
            let value = self.parse_tuple(false, true, &[], false)?;
            return Ok(Stmt::Assign(Assign {
                target,
                value,
                region: self.statement_region(begin)?,
            }));
        }

        let filters = match self.skip_if(Token::Operator(Operator::Pipe))? {
            Some(_) => self.parse_filter_chain()?,
            None => vec![],
        };
        let (body, _) = self.parse_statements("set", &["endset"], true)?;

        Ok(Stmt::AssignBlock(AssignBlock {
            target,
            filters,
            body,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_with(&mut self, begin: Region, is_async: bool) -> Result<Stmt, Error> {
        let mut targets = vec![];
        let mut values = vec![];
        while !self.next_is_block_end()? && !self.next_is_operator(Operator::Colon)? {
            if !targets.is_empty() {
                self.next_must_operator(Operator::Comma)?;
            }
            let mut target = self.parse_assign_target(false, false, &[], false)?;
            set_ctx(&mut target, SetCtx::Param);
            self.next_must_operator(Operator::Assign)?;
            values.push(self.parse_expression()?);
            targets.push(target);
        }
        let (body, _) = self.parse_statements("with", &["endwith"], true)?;

        Ok(Stmt::With(With {
            targets,
            values,
            body,
            is_async,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_autoescape(&mut self, begin: Region) -> Result<Stmt, Error> {
        let enabled = self.parse_expression()?;
        let (body, _) = self.parse_statements("autoescape", &["endautoescape"], true)?;

        Ok(Stmt::Autoescape(Autoescape {
            enabled,
            body,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_import(&mut self, begin: Region) -> Result<Stmt, Error> {
        let template = self.parse_expression()?;
        self.next_must_name("as")?;
        let (alias, _) = self.parse_identifier()?;
        let with_context = self.parse_context(false)?;

        Ok(Stmt::Import(Import {
            template,
            alias,
            with_context,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_from(&mut self, begin: Region) -> Result<Stmt, Error> {
        let template = self.parse_expression()?;
        self.next_must_name("import")?;

        let mut names = vec![];
        let mut with_context = false;
        loop {
            if !names.is_empty() {
                self.next_must_operator(Operator::Comma)?;
            }
            if self.is_context_modifier()? {
                with_context = self.parse_context(false)?;
                break;
            }

            let (name, region) = self.parse_identifier()?;
            if name.starts_with('_') {
                return Err(self
                    .assertion(format!("cannot import `{name}`"), region)
                    .with_help("names starting with an underscore are private"));
            }
            let alias = match self.skip_name("as")? {
                Some(_) => Some(self.parse_identifier()?.0),
                None => None,
            };
            names.push((name, alias, region));

            if self.is_context_modifier()? {
                with_context = self.parse_context(false)?;
                break;
            }
            if !self.next_is_operator(Operator::Comma)? {
                break;
            }
        }

        Ok(Stmt::FromImport(FromImport {
            template,
            names,
            with_context,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_include(&mut self, begin: Region) -> Result<Stmt, Error> {
        let template = self.parse_expression()?;
        let ignore_missing = self.next_is_name("ignore")? && self.nth_is_name(1, "missing")?;
        if ignore_missing {
            self.next()?;
            self.next()?;
        }
        let with_context = self.parse_context(true)?;

        Ok(Stmt::Include(Include {
            template,
            ignore_missing,
            with_context,
            region: self.statement_region(begin)?,
        }))
    }

    /// Return true if `with context` or `without context` follows.
    fn is_context_modifier(&mut self) -> Result<bool, Error> {
        Ok((self.next_is_name("with")? || self.next_is_name("without")?)
            && self.nth_is_name(1, "context")?)
    }

    /// Parse an optional `with context` or `without context`.
    fn parse_context(&mut self, default: bool) -> Result<bool, Error> {
        if !self.is_context_modifier()? {
            return Ok(default);
        }
        let with = self.next_is_name("with")?;
        self.next()?;
        self.next()?;

        Ok(with)
    }

    fn parse_trans(
        &mut self,
        begin: Region,
        tag: &'static str,
        end_tag: &'static str,
    ) -> Result<Stmt, Error> {
        let mut context = None;
        let mut trimmed = None;
        let mut variables: Vec<(String, Expr)> = vec![];
        let mut explicit_count = None;

        while !self.next_is_block_end()? {
            self.skip_if(Token::Operator(Operator::Comma))?;
            if self.skip_if(Token::Operator(Operator::Colon))?.is_some() {
                break;
            }
            let followed_by_assign = self
                .peek_nth(1)?
                .is_some_and(|(t, _)| t == Token::Operator(Operator::Assign));

            let mut is_count = false;
            match self.peek()? {
                Some((Token::String, region)) if context.is_none() => {
                    self.next()?;
                    context = Some(self.parse_string(region)?);
                    continue;
                }
                Some((Token::Name, region)) if !followed_by_assign => match self.text(region) {
                    "context" if self.peek_nth(1)?.is_some_and(|(t, _)| t == Token::String) => {
                        self.next()?;
                        let (_, string) = self.next_any_must()?;
                        context = Some(self.parse_string(string)?);
                        continue;
                    }
                    "trimmed" | "notrimmed" if trimmed.is_none() => {
                        trimmed = Some(self.text(region) == "trimmed");
                        self.next()?;
                        continue;
                    }
                    "with" => {
                        self.next()?;
                        continue;
                    }
                    "count" if self.starts_binding(1)? => {
                        self.next()?;
                        is_count = true;
                    }
                    _ => {}
                },
                _ => {}
            }

            let (name, value, region) = self.parse_trans_binding()?;
            if variables.iter().any(|(n, _)| *n == name) {
                return Err(self.assertion(
                    format!("translatable variable `{name}` defined twice"),
                    region,
                ));
            }
            if is_count {
                explicit_count = Some(name.clone());
            }
            variables.push((name, value));
        }
        self.next_block_end()?;

        let mut referenced = vec![];
        let (mut singular, needle) = self.parse_trans_body(&mut referenced, tag, end_tag, true)?;
        let mut plural = None;
        let mut pluralize_count = None;
        if needle != end_tag {
            if self.next_is(Token::Name)? {
                let (name, region) = self.parse_identifier()?;
                if !variables.iter().any(|(n, _)| *n == name) {
                    return Err(self.assertion(
                        format!("unknown variable `{name}` for pluralization"),
                        region,
                    ));
                }
                pluralize_count = Some(name);
            }
            self.next_block_end()?;
            let (text, _) = self.parse_trans_body(&mut referenced, tag, end_tag, false)?;
            plural = Some(text);
        }

        referenced.retain(|name| !variables.iter().any(|(n, _)| n == name));
        let count = match plural {
            Some(_) => {
                let count = explicit_count
                    .or(pluralize_count)
                    .or_else(|| variables.first().map(|(n, _)| n.clone()))
                    .or_else(|| referenced.first().cloned());
                if count.is_none() {
                    let region = self.peek_region()?;
                    return Err(self
                        .error("pluralize without a count", region)
                        .with_help("bind a variable in the tag, like `count=items|length`"));
                }
                count
            }
            None => None,
        };

        if trimmed == Some(true) {
            singular = trim_whitespace(&singular);
            plural = plural.map(|p| trim_whitespace(&p));
        }

        Ok(Stmt::Trans(Arc::new(Trans {
            context,
            variables,
            referenced,
            count,
            singular,
            plural,
            region: self.statement_region(begin)?,
        })))
    }

    /// Return true if the token `n` places ahead begins a binding.
    fn starts_binding(&mut self, n: usize) -> Result<bool, Error> {
        Ok(!matches!(
            self.peek_nth(n)?,
            None | Some((
                Token::BlockEnd
                    | Token::LineStatementEnd
                    | Token::Operator(Operator::Assign | Operator::Comma),
                _
            ))
        ))
    }

    /// Parse `name=expr`, `expr as name` or a bare `name`.
    fn parse_trans_binding(&mut self) -> Result<(String, Expr, Region), Error> {
        let assigns = matches!(self.peek()?, Some((Token::Name, _)))
            && self
                .peek_nth(1)?
                .is_some_and(|(t, _)| t == Token::Operator(Operator::Assign));
        if assigns {
            let (name, region) = self.parse_identifier()?;
            self.next()?;
            let value = self.parse_expression()?;
            return Ok((name, value, region));
        }

        let value = self.parse_expression()?;
        if self.skip_name("as")?.is_some() {
            let (name, region) = self.parse_identifier()?;
            return Ok((name, value, region));
        }
        match value.as_name() {
            Some(name) => Ok((name.to_string(), value.clone(), value.region())),
            None => Err(self
                .error("expected a variable name", value.region())
                .with_help("bind the expression to a name, like `total=price * 2`")),
        }
    }

    /// Parse the text of a translatable section up to `pluralize` or the
    /// end tag, which is consumed and returned.
    fn parse_trans_body(
        &mut self,
        referenced: &mut Vec<String>,
        tag: &'static str,
        end_tag: &'static str,
        allow_pluralize: bool,
    ) -> Result<(String, String), Error> {
        let mut text = String::new();
        loop {
            let (token, region) = match self.next()? {
                Some(next) => next,
                None => {
                    return Err(self
                        .error(format!("unclosed `{tag}` block"), self.eof_region())
                        .with_help(format!("expected `{end_tag}`")))
                }
            };
            match token {
                Token::Data => text.push_str(&self.data(region).replace('%', "%%")),
                Token::VariableBegin => {
                    let (name, _) = self.parse_identifier()?;
                    self.next_must(Token::VariableEnd)?;
                    text.push_str(&format!("%({name})s"));
                    if !referenced.contains(&name) {
                        referenced.push(name);
                    }
                }
                token if token.is_block_begin() => {
                    let (name, region) = self.parse_identifier()?;
                    match name.as_str() {
                        found if found == end_tag => return Ok((text, name.clone())),
                        "pluralize" | "plural" if allow_pluralize => {
                            return Ok((text, name.clone()))
                        }
                        "pluralize" | "plural" => {
                            return Err(self.error(
                                "a translatable section can have only one pluralize section",
                                region,
                            ))
                        }
                        "trans" | "blocktrans" => {
                            return Err(self
                                .error(format!("`{name}` blocks cannot be nested"), region)
                                .with_help(format!("did you mean `{end_tag}`?")))
                        }
                        _ => {
                            return Err(self.error(
                                format!(
                                    "control structures in translatable sections are not allowed, found `{name}`"
                                ),
                                region,
                            ))
                        }
                    }
                }
                token => return Err(self.unexpected(token, region, "translatable text")),
            }
        }
    }

    fn parse_do(&mut self, begin: Region) -> Result<Stmt, Error> {
        let expr = self.parse_tuple(false, true, &[], false)?;

        Ok(Stmt::Do(Do {
            expr,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_loop_control(
        &mut self,
        begin: Region,
        keyword: Keyword,
        region: Region,
    ) -> Result<Stmt, Error> {
        if self.loops == 0 {
            return Err(self.error(format!("`{keyword}` outside of a loop"), region));
        }
        let region = self.statement_region(begin)?;

        Ok(match keyword {
            Keyword::Break => Stmt::Break(region),
            _ => Stmt::Continue(region),
        })
    }

    fn parse_spaceless(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (body, _) = self.parse_statements("spaceless", &["endspaceless"], true)?;

        Ok(Stmt::Spaceless(Spaceless {
            body,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_namespace(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (name, _) = self.parse_identifier()?;
        let (body, _) = self.parse_statements("namespace", &["endnamespace"], true)?;

        Ok(Stmt::Namespace(NamespaceBlock {
            name,
            body,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_export(&mut self, begin: Region) -> Result<Stmt, Error> {
        let mut names = vec![self.parse_identifier()?];
        while self.skip_if(Token::Operator(Operator::Comma))?.is_some() {
            names.push(self.parse_identifier()?);
        }

        Ok(Stmt::Export(Export {
            names,
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_scope(&mut self, begin: Region) -> Result<Stmt, Error> {
        let (body, _) = self.parse_statements("scope", &["endscope"], true)?;

        Ok(Stmt::Scope(Scope {
            body,
            region: self.statement_region(begin)?,
        }))
    }

    /// Parse the content of a `raw` or `verbatim` block as template data.
    fn parse_raw(&mut self, begin: Region, end_tag: &str) -> Result<Stmt, Error> {
        self.next_block_end()?;

        let mut node = Data {
            text: String::new(),
            region: self.peek_region()?,
        };
        if let Some((Token::Data, region)) = self.peek()? {
            self.next()?;
            node = Data {
                text: self.data(region),
                region,
            };
        }
        self.next_must(Token::BlockBegin)?;
        self.next_must_name(end_tag)?;

        Ok(Stmt::Output(Output {
            nodes: vec![Expr::TemplateData(node)],
            region: self.statement_region(begin)?,
        }))
    }

    fn parse_async(&mut self, begin: Region, region: Region) -> Result<Stmt, Error> {
        if !self.options.enable_async {
            return Err(self
                .error("async statements are only allowed in async templates", region)
                .with_help("set `enable_async` on the engine to use `async for` and `async with`"));
        }

        match self.next_any_must()? {
            (Token::Name, next) if self.text(next) == "for" => self.parse_for(begin, true),
            (Token::Name, next) if self.text(next) == "with" => self.parse_with(begin, true),
            (token, next) => Err(self.unexpected(token, next, "`for` or `with`")),
        }
    }
}

/// Build a macro definition, detecting the implicit names it uses.
fn build_macro(name: String, params: Params, body: Vec<Stmt>, region: Region) -> Macro {
    let found = NameFinder::find(&IMPLICIT_NAMES, &body);

    Macro {
        name,
        uses_caller: found[0] && !params.declares("caller"),
        uses_varargs: found[1] && params.varargs.is_none() && !params.declares("varargs"),
        uses_kwargs: found[2] && params.kwargs.is_none() && !params.declares("kwargs"),
        params,
        body,
        region,
    }
}

/// Return true if the body only renders whitespace.
fn is_blank(body: &[Stmt]) -> bool {
    body.iter().all(|stmt| match stmt {
        Stmt::Output(output) => output.nodes.iter().all(|node| match node {
            Expr::TemplateData(data) => data.text.trim().is_empty(),
            _ => false,
        }),
        _ => false,
    })
}

/// Collapse whitespace around newlines into a single space.
fn trim_whitespace(text: &str) -> String {
    text.trim()
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::trim_whitespace;
    use crate::{
        compile::{
            tree::{Expr, Stmt},
            Options, Parser,
        },
        log::ErrorKind,
    };

    #[test]
    fn test_if_elif_else() {
        let body = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}");
        let Stmt::If(i) = &body[0] else {
            panic!("expected if");
        };

        assert_eq!(i.branches.len(), 2);
        assert!(i.otherwise.is_some());
    }

    #[test]
    fn test_for_with_filter_and_else() {
        let body = parse("{% for a, b in items if a recursive %}x{% else %}y{% endfor %}");
        let Stmt::For(f) = &body[0] else {
            panic!("expected for");
        };

        assert!(matches!(&f.target, Expr::Tuple(t) if t.items.len() == 2));
        assert!(f.filter.is_some());
        assert!(f.recursive);
        assert!(f.otherwise.is_some());
    }

    #[test]
    fn test_block_registered() {
        let options = Options::default();
        let template = Parser::new(
            "{% block outer %}{% block inner scoped %}{% endblock %}{% endblock outer %}",
            &options,
        )
        .parse()
        .unwrap();

        assert_eq!(template.blocks.len(), 2);
        assert!(template.blocks["inner"].scoped);
    }

    #[test]
    fn test_duplicate_block() {
        let error = parse_err("{% block a %}{% endblock %}{% block a %}{% endblock %}");

        assert!(error.reason().contains("defined twice"));
    }

    #[test]
    fn test_required_block_with_content() {
        assert!(parse_ok("{% block a required %}\n  {# note #}\n{% endblock %}"));
        let error = parse_err("{% block a required %}content{% endblock %}");

        assert!(error.reason().contains("required block"));
    }

    #[test]
    fn test_extends_constant() {
        let options = Options::default();
        let template = Parser::new("{% extends 'base' ~ '.html' %}", &options)
            .parse()
            .unwrap();

        assert_eq!(template.extends.map(|(name, _)| name), Some("base.html".into()));
        assert!(parse_err("{% extends name %}")
            .help()
            .unwrap_or_default()
            .contains("dynamic"));
    }

    #[test]
    fn test_extends_nested() {
        let error = parse_err("{% if x %}{% extends 'base' %}{% endif %}");

        assert_eq!(error.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn test_macro_implicit_names() {
        let options = Options::default();
        let template = Parser::new(
            "{% macro m(a) %}{{ caller() }}{{ varargs }}{% endmacro %}",
            &options,
        )
        .parse()
        .unwrap();
        let m = &template.macros["m"];

        assert!(m.uses_caller);
        assert!(m.uses_varargs);
        assert!(!m.uses_kwargs);
    }

    #[test]
    fn test_call_block() {
        let body = parse("{% call(user) list(users) %}{{ user }}{% endcall %}");
        let Stmt::CallBlock(c) = &body[0] else {
            panic!("expected call block");
        };

        assert_eq!(c.caller.name, "caller");
        assert_eq!(c.caller.params.positional.len(), 1);
        assert!(parse_err("{% call name %}{% endcall %}")
            .reason()
            .contains("expected a call"));
    }

    #[test]
    fn test_set_forms() {
        let body = parse("{% set a, b = 1, 2 %}{% set ns.x = 1 %}{% set c | upper %}x{% endset %}");

        assert!(matches!(&body[0], Stmt::Assign(a) if matches!(a.target, Expr::Tuple(_))));
        assert!(matches!(&body[1], Stmt::Assign(a) if matches!(a.target, Expr::NsRef(_))));
        assert!(matches!(&body[2], Stmt::AssignBlock(a) if a.filters.len() == 1));
    }

    #[test]
    fn test_imports() {
        let body = parse(
            "{% import 'm' as m %}{% from 'm' import a as b, c with context %}{% include 'x' ignore missing without context %}",
        );

        assert!(matches!(&body[0], Stmt::Import(i) if !i.with_context && i.alias == "m"));
        let Stmt::FromImport(f) = &body[1] else {
            panic!("expected from import");
        };
        assert_eq!(f.names.len(), 2);
        assert_eq!(f.names[0].1.as_deref(), Some("b"));
        assert!(f.with_context);
        assert!(matches!(&body[2], Stmt::Include(i) if i.ignore_missing && !i.with_context));
    }

    #[test]
    fn test_import_private_name() {
        let error = parse_err("{% from 'm' import _private %}");

        assert_eq!(error.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn test_trans() {
        let body = parse(
            "{% trans user=name %}Hello {{ user }}, 100%{% pluralize %}Hi {{ user }}s{% endtrans %}",
        );
        let Stmt::Trans(t) = &body[0] else {
            panic!("expected trans");
        };

        assert_eq!(t.singular, "Hello %(user)s, 100%%");
        assert_eq!(t.plural.as_deref(), Some("Hi %(user)ss"));
        assert_eq!(t.count.as_deref(), Some("user"));
        assert!(t.referenced.is_empty());
    }

    #[test]
    fn test_trans_count_and_trimmed() {
        let body = parse(
            "{% blocktrans trimmed count n=items|length %}\n  one  \n  item\n{% plural %}{{ n }} items{% endblocktrans %}",
        );
        let Stmt::Trans(t) = &body[0] else {
            panic!("expected trans");
        };

        assert_eq!(t.singular, "one item");
        assert_eq!(t.count.as_deref(), Some("n"));
    }

    #[test]
    fn test_trans_errors() {
        assert_eq!(
            parse_err("{% trans a=1, a=2 %}{% endtrans %}").kind(),
            ErrorKind::Assertion
        );
        assert!(parse_err("{% trans %}one{% pluralize %}many{% endtrans %}")
            .reason()
            .contains("pluralize without a count"));
        assert!(parse_err("{% trans %}{% if x %}{% endif %}{% endtrans %}")
            .reason()
            .contains("control structures"));
    }

    #[test]
    fn test_loop_control() {
        assert!(parse_ok("{% for x in y %}{% break %}{% endfor %}"));
        assert!(parse_err("{% break %}").reason().contains("outside of a loop"));
        assert!(
            parse_err("{% for x in y %}{% macro m() %}{% continue %}{% endmacro %}{% endfor %}")
                .reason()
                .contains("outside of a loop")
        );
    }

    #[test]
    fn test_raw() {
        let body = parse("{% raw %}{{ x }}{% endraw %}");
        let Stmt::Output(output) = &body[0] else {
            panic!("expected output");
        };

        assert!(matches!(&output.nodes[0], Expr::TemplateData(d) if d.text == "{{ x }}"));
    }

    #[test]
    fn test_async_requires_flag() {
        let error = parse_err("{% async for x in y %}{% endfor %}");
        assert!(error.help().unwrap_or_default().contains("enable_async"));

        let options = Options {
            enable_async: true,
            ..Options::default()
        };
        let body = Parser::new("{% async for x in y %}{% endfor %}", &options)
            .parse()
            .unwrap()
            .body;
        assert!(matches!(&body[0], Stmt::For(f) if f.is_async));
    }

    #[test]
    fn test_misc_statements() {
        let body = parse(
            "{% with a=1, b=2 %}{% endwith %}{% namespace ns %}{% endnamespace %}{% export a, b %}{% scope %}{% endscope %}{% spaceless %}{% endspaceless %}{% filter upper|trim %}{% endfilter %}{% print 1, 2 %}",
        );

        assert!(matches!(&body[0], Stmt::With(w) if w.targets.len() == 2));
        assert!(matches!(&body[1], Stmt::Namespace(n) if n.name == "ns"));
        assert!(matches!(&body[2], Stmt::Export(e) if e.names.len() == 2));
        assert!(matches!(&body[3], Stmt::Scope(_)));
        assert!(matches!(&body[4], Stmt::Spaceless(_)));
        assert!(matches!(&body[5], Stmt::FilterBlock(f) if f.filters.len() == 2));
        assert!(matches!(&body[6], Stmt::Output(o) if o.nodes.len() == 2));
    }

    #[test]
    fn test_line_statements() {
        let options = Options {
            syntax: crate::syntax::Builder::new()
                .with_line_statement("#")
                .to_syntax(),
            ..Options::default()
        };
        let body = Parser::new("# for x in y\n{{ x }}\n# endfor\n", &options)
            .parse()
            .unwrap()
            .body;

        assert!(matches!(&body[0], Stmt::For(_)));
    }

    #[test]
    fn test_trim_whitespace() {
        assert_eq!(trim_whitespace("  a \n\n  b  \n c "), "a b c");
    }

    fn parse(source: &str) -> Vec<Stmt> {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap().body
    }

    fn parse_ok(source: &str) -> bool {
        let options = Options::default();
        Parser::new(source, &options).parse().is_ok()
    }

    fn parse_err(source: &str) -> crate::log::Error {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap_err()
    }
}
