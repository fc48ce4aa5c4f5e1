//! Builds the node tree from lexed tokens.
//!
//! Function names and `$variables` are resolved here, so an unknown name is
//! a parse failure rather than an execution failure.

use std::collections::HashMap;

use super::exec::Function;
use super::lexer::{Token, TokenKind};
use super::{TemplateError, MAX_DEPTH};

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    With(Branch),
    Range(Branch),
    /// `{{template "name" pipeline}}`, also produced by `{{block}}`.
    Template(Call),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub line: usize,
    pub name: String,
    pub pipe: Option<Pipeline>,
}

/// The main body plus every named body from `define` and `block`.
#[derive(Debug, Default)]
pub(crate) struct Tree {
    pub root: Vec<Node>,
    pub defines: HashMap<String, Vec<Node>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub line: usize,
    pub decl: Vec<String>,
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub(crate) enum Arg {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Func(String, Function),
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
    Pipe(Box<Pipeline>),
}

/// Where a list of nodes stopped.
enum Stop {
    End,
    Else,
    Eof,
}

#[derive(Clone, Copy, PartialEq)]
enum Closing {
    Delim,
    Paren,
}

pub(crate) fn parse(
    tokens: Vec<Token>,
    funcs: &HashMap<&'static str, Function>,
) -> Result<Tree, TemplateError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        funcs,
        vars: vec!["$".to_string()],
        depth: 0,
        range_depth: 0,
        defines: HashMap::new(),
    };

    let (root, stop) = parser.parse_list(true)?;
    match stop {
        Stop::Eof => Ok(Tree {
            root,
            defines: parser.defines,
        }),
        Stop::End => Err(parser.error("unexpected {{end}}")),
        Stop::Else => Err(parser.error("unexpected {{else}}")),
    }
}

struct Parser<'f> {
    tokens: Vec<Token>,
    pos: usize,
    funcs: &'f HashMap<&'static str, Function>,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    depth: usize,
    /// Enclosing `range` bodies, for `break` and `continue`.
    range_depth: usize,
    defines: HashMap<String, Vec<Node>>,
}

impl<'f> Parser<'f> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek_keyword(&self) -> Option<&str> {
        match self.peek() {
            Some(TokenKind::Ident(word)) => Some(word.as_str()),
            _ => None,
        }
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<(), TemplateError> {
        match self.next().map(|t| t.kind) {
            Some(TokenKind::RightDelim) => Ok(()),
            _ => Err(self.error(format!("unexpected token in {}", context))),
        }
    }

    fn enter(&mut self) -> Result<(), TemplateError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("max nesting depth exceeded"));
        }
        Ok(())
    }

    /// `define` is only accepted in the top-level list.
    fn parse_list(&mut self, top: bool) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();

        loop {
            let Some(token) = self.next() else {
                return Ok((nodes, Stop::Eof));
            };

            match token.kind {
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::LeftDelim => match self.peek_keyword().map(str::to_string).as_deref() {
                    Some("end") => {
                        self.pos += 1;
                        self.expect_right_delim("end")?;
                        return Ok((nodes, Stop::End));
                    }
                    Some("else") => {
                        self.pos += 1;
                        return Ok((nodes, Stop::Else));
                    }
                    Some("if") => {
                        self.pos += 1;
                        nodes.push(Node::If(self.parse_branch("if")?));
                    }
                    Some("with") => {
                        self.pos += 1;
                        nodes.push(Node::With(self.parse_branch("with")?));
                    }
                    Some("range") => {
                        self.pos += 1;
                        nodes.push(Node::Range(self.parse_branch("range")?));
                    }
                    Some("define") if top => {
                        self.pos += 1;
                        self.parse_define()?;
                    }
                    Some("template") => {
                        self.pos += 1;
                        nodes.push(Node::Template(self.parse_template_call()?));
                    }
                    Some("block") => {
                        self.pos += 1;
                        nodes.push(Node::Template(self.parse_block()?));
                    }
                    Some(word @ ("break" | "continue")) => {
                        self.pos += 1;
                        self.expect_right_delim(word)?;
                        if self.range_depth == 0 {
                            return Err(self.error(format!("{{{{{}}}}} outside {{{{range}}}}", word)));
                        }
                        nodes.push(if word == "break" { Node::Break } else { Node::Continue });
                    }
                    _ => nodes.push(Node::Action(self.parse_pipeline("command", Closing::Delim)?)),
                },
                other => return Err(self.error(format!("unexpected {:?}", other))),
            }
        }
    }

    /// Parses `pipeline}} list [{{else ...}} list] {{end}}` after the keyword.
    fn parse_branch(&mut self, keyword: &'static str) -> Result<Branch, TemplateError> {
        self.enter()?;
        let mark = self.vars.len();
        let pipe = self.parse_pipeline(keyword, Closing::Delim)?;
        let scope = self.vars.len();

        if keyword == "range" {
            self.range_depth += 1;
        }
        let (list, stop) = self.parse_list(false)?;
        if keyword == "range" {
            self.range_depth -= 1;
        }
        self.vars.truncate(scope);

        let else_list = match stop {
            Stop::End => Vec::new(),
            Stop::Eof => return Err(self.error(format!("unexpected EOF in {}", keyword))),
            Stop::Else => self.parse_else(keyword)?,
        };

        self.vars.truncate(mark);
        self.depth -= 1;

        Ok(Branch {
            pipe,
            list,
            else_list,
        })
    }

    /// Parses what follows `{{else`, through the closing `{{end}}`.
    fn parse_else(&mut self, keyword: &'static str) -> Result<Vec<Node>, TemplateError> {
        // `{{else if ...}}` and `{{else with ...}}` chain into a nested
        // branch that shares the outer `{{end}}`.
        if keyword != "range" && self.peek_keyword() == Some(keyword) {
            self.pos += 1;
            let nested = self.parse_branch(keyword)?;
            return Ok(vec![match keyword {
                "if" => Node::If(nested),
                _ => Node::With(nested),
            }]);
        }

        self.expect_right_delim("else")?;
        let (else_list, stop) = self.parse_list(false)?;
        match stop {
            Stop::End => Ok(else_list),
            Stop::Else => Err(self.error(format!("expected end; found else in {}", keyword))),
            Stop::Eof => Err(self.error(format!("unexpected EOF in {}", keyword))),
        }
    }

    /// `{{define "name"}} list {{end}}`, after the keyword.
    fn parse_define(&mut self) -> Result<(), TemplateError> {
        let name = self.expect_name("define clause")?;
        self.expect_right_delim("define clause")?;
        let body = self.parse_body("define clause")?;
        self.add_define(name, body)
    }

    /// `{{template "name" [pipeline]}}`, after the keyword.
    fn parse_template_call(&mut self) -> Result<Call, TemplateError> {
        let line = self.line();
        let name = self.expect_name("template clause")?;

        let pipe = if matches!(self.peek(), Some(TokenKind::RightDelim)) {
            self.pos += 1;
            None
        } else {
            Some(self.parse_pipeline("template clause", Closing::Delim)?)
        };

        Ok(Call { line, name, pipe })
    }

    /// `{{block "name" pipeline}} list {{end}}`: defines `name` and invokes
    /// it in place.
    fn parse_block(&mut self) -> Result<Call, TemplateError> {
        let line = self.line();
        let name = self.expect_name("block clause")?;
        let pipe = self.parse_pipeline("block clause", Closing::Delim)?;
        let body = self.parse_body("block clause")?;
        self.add_define(name.clone(), body)?;

        Ok(Call {
            line,
            name,
            pipe: Some(pipe),
        })
    }

    fn expect_name(&mut self, context: &str) -> Result<String, TemplateError> {
        match self.next().map(|t| t.kind) {
            Some(TokenKind::Str(name)) => Ok(name),
            _ => Err(self.error(format!("unexpected token in {}", context))),
        }
    }

    /// A named body runs with only `$` in scope and outside any `range`.
    fn parse_body(&mut self, context: &str) -> Result<Vec<Node>, TemplateError> {
        self.enter()?;
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::replace(&mut self.range_depth, 0);

        let result = self.parse_list(false);

        self.vars = vars;
        self.range_depth = range_depth;
        self.depth -= 1;

        match result? {
            (list, Stop::End) => Ok(list),
            (_, Stop::Else) => Err(self.error(format!("unexpected {{{{else}}}} in {}", context))),
            (_, Stop::Eof) => Err(self.error(format!("unexpected EOF in {}", context))),
        }
    }

    /// A blank body never replaces a non-blank one; two non-blank bodies
    /// under one name are an error.
    fn add_define(&mut self, name: String, body: Vec<Node>) -> Result<(), TemplateError> {
        if let Some(existing) = self.defines.get(&name) {
            if !is_blank(existing) {
                if is_blank(&body) {
                    return Ok(());
                }
                return Err(self.error(format!("multiple definition of template {:?}", name)));
            }
        }
        self.defines.insert(name, body);
        Ok(())
    }

    fn parse_pipeline(
        &mut self,
        context: &str,
        closing: Closing,
    ) -> Result<Pipeline, TemplateError> {
        let line = self.line();
        let (decl, is_assign) = if closing == Closing::Delim {
            self.parse_declarations(context)?
        } else {
            (Vec::new(), false)
        };

        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(closing)?;
            let Some(token) = self.next() else {
                return Err(self.error("unclosed action"));
            };

            if cmd.args.is_empty() {
                return Err(self.error(format!("missing value for {}", context)));
            }
            cmds.push(cmd);

            match token.kind {
                TokenKind::Pipe => continue,
                TokenKind::RightDelim | TokenKind::RightParen => break,
                other => return Err(self.error(format!("unexpected {:?} in {}", other, context))),
            }
        }

        for (stage, cmd) in cmds.iter().enumerate().skip(1) {
            if !matches!(cmd.args[0], Arg::Func(..)) {
                return Err(self.error(format!(
                    "non executable command in pipeline stage {}",
                    stage + 1
                )));
            }
        }

        if !is_assign {
            self.vars.extend(decl.iter().cloned());
        }

        Ok(Pipeline {
            line,
            decl,
            is_assign,
            cmds,
        })
    }

    fn parse_declarations(&mut self, context: &str) -> Result<(Vec<String>, bool), TemplateError> {
        let names = match (self.peek(), self.peek_at(1)) {
            (Some(TokenKind::Variable(name, path)), next) if path.is_empty() && is_binding(next) => {
                vec![name.clone()]
            }
            (Some(TokenKind::Variable(first, p1)), Some(TokenKind::Comma)) if p1.is_empty() => {
                match (self.peek_at(2), self.peek_at(3)) {
                    (Some(TokenKind::Variable(second, p2)), next)
                        if p2.is_empty() && is_binding(next) && context == "range" =>
                    {
                        vec![first.clone(), second.clone()]
                    }
                    _ => return Err(self.error(format!("too many declarations in {}", context))),
                }
            }
            _ => return Ok((Vec::new(), false)),
        };

        // Skip names, commas and the binding operator.
        self.pos += names.len() * 2 - 1;
        let is_assign = matches!(self.next().map(|t| t.kind), Some(TokenKind::Assign));

        if is_assign {
            for name in &names {
                if !self.vars.contains(name) {
                    return Err(self.error(format!("undefined variable: {}", name)));
                }
            }
        }

        Ok((names, is_assign))
    }

    fn parse_command(&mut self, closing: Closing) -> Result<Command, TemplateError> {
        let mut args = Vec::new();

        loop {
            let arg = match self.peek().cloned() {
                None => return Err(self.error("unclosed action")),
                Some(TokenKind::Pipe) => break,
                Some(TokenKind::RightDelim) if closing == Closing::Delim => break,
                Some(TokenKind::RightParen) if closing == Closing::Paren => break,
                Some(TokenKind::RightDelim) => return Err(self.error("unclosed left paren")),
                Some(TokenKind::RightParen) => return Err(self.error("unexpected right paren")),
                Some(_) => self.parse_operand()?,
            };
            args.push(arg);
        }

        match args.first() {
            Some(Arg::Func(..)) | None => {}
            Some(Arg::Nil) if args.len() == 1 => {
                return Err(self.error("nil is not a command"));
            }
            Some(first) if args.len() > 1 => {
                return Err(self.error(format!(
                    "can't give argument to non-function {}",
                    describe(first)
                )));
            }
            Some(_) => {}
        }

        Ok(Command { args })
    }

    fn parse_operand(&mut self) -> Result<Arg, TemplateError> {
        let Some(token) = self.next() else {
            return Err(self.error("unclosed action"));
        };

        let arg = match token.kind {
            TokenKind::Dot => Arg::Dot,
            TokenKind::Field(path) => Arg::Field(path),
            TokenKind::Variable(name, path) => {
                if !self.vars.contains(&name) {
                    return Err(self.error(format!("undefined variable \"{}\"", name)));
                }
                Arg::Variable(name, path)
            }
            TokenKind::Str(s) => Arg::Str(s),
            TokenKind::Int(n) => Arg::Int(n),
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Arg::Bool(true),
                "false" => Arg::Bool(false),
                "nil" => Arg::Nil,
                "if" | "else" | "end" | "with" | "range" | "define" | "template" | "block"
                | "break" | "continue" => {
                    return Err(self.error(format!("unexpected keyword {} in command", word)));
                }
                _ => match self.funcs.get(word.as_str()) {
                    Some(func) => Arg::Func(word, *func),
                    None => {
                        return Err(self.error(format!("function \"{}\" not defined", word)));
                    }
                },
            },
            TokenKind::LeftParen => {
                self.enter()?;
                let pipe = self.parse_pipeline("parenthesized pipeline", Closing::Paren)?;
                self.depth -= 1;
                Arg::Pipe(Box::new(pipe))
            }
            other => return Err(self.error(format!("unexpected {:?} in operand", other))),
        };

        Ok(arg)
    }
}

fn is_blank(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .all(|node| matches!(node, Node::Text(text) if text.trim().is_empty()))
}

fn is_binding(kind: Option<&TokenKind>) -> bool {
    matches!(kind, Some(TokenKind::Declare) | Some(TokenKind::Assign))
}

fn describe(arg: &Arg) -> String {
    match arg {
        Arg::Dot => ".".to_string(),
        Arg::Field(path) => format!(".{}", path.join(".")),
        Arg::Variable(name, _) => name.clone(),
        Arg::Func(name, _) => name.clone(),
        Arg::Str(s) => format!("{:?}", s),
        Arg::Int(n) => n.to_string(),
        Arg::Bool(b) => b.to_string(),
        Arg::Nil => "nil".to_string(),
        Arg::Pipe(_) => "(pipeline)".to_string(),
    }
}
