//! Splits template text into text runs and action tokens.

use super::TemplateError;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const TRIMMED_RIGHT_DELIM: &str = "-}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    LeftDelim,
    RightDelim,
    Ident(String),
    /// `.a.b` as the path `["a", "b"]`.
    Field(Vec<String>),
    /// `$x.a` as (`"$x"`, `["a"]`). The root variable is `"$"`.
    Variable(String, Vec<String>),
    Dot,
    Str(String),
    Int(i64),
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    Declare,
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub(crate) fn lex(src: &str) -> Result<Vec<Token>, TemplateError> {
    Lexer {
        src,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        trim_next: false,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    /// Set by `-}}`: strip leading whitespace from the next text run.
    trim_next: bool,
}

fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn ident_len(s: &str) -> usize {
    s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len())
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, TemplateError> {
        let src = self.src;

        loop {
            let rest = &src[self.pos..];
            let Some(offset) = rest.find(LEFT_DELIM) else {
                self.push_text(rest);
                self.advance(rest.len());
                return Ok(self.tokens);
            };

            let after = &rest[offset + LEFT_DELIM.len()..];
            let trim_left = after.starts_with('-') && after[1..].starts_with(is_trim_space);

            let text = &rest[..offset];
            if trim_left {
                self.push_text(text.trim_end_matches(is_trim_space));
            } else {
                self.push_text(text);
            }
            self.advance(offset + LEFT_DELIM.len());
            if trim_left {
                self.advance(1);
            }

            let inner = &src[self.pos..];
            let leading = inner.len() - inner.trim_start_matches(is_trim_space).len();
            if inner[leading..].starts_with("/*") && (trim_left || leading == 0) {
                self.advance(leading);
                self.lex_comment()?;
            } else {
                self.emit(TokenKind::LeftDelim);
                self.lex_action()?;
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = if self.trim_next {
            self.trim_next = false;
            text.trim_start_matches(is_trim_space)
        } else {
            text
        };

        if !text.is_empty() {
            self.emit(TokenKind::Text(text.to_string()));
        }
    }

    fn emit(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn advance(&mut self, n: usize) {
        self.line += self.src[self.pos..self.pos + n].matches('\n').count();
        self.pos += n;
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn lex_comment(&mut self) -> Result<(), TemplateError> {
        let Some(end) = self.rest().find("*/") else {
            return Err(self.error("unclosed comment"));
        };
        self.advance(end + 2);

        let rest = self.rest();
        if rest.starts_with(RIGHT_DELIM) {
            self.advance(RIGHT_DELIM.len());
            return Ok(());
        }

        let trimmed = rest.trim_start_matches(is_trim_space);
        if trimmed.len() < rest.len() && trimmed.starts_with(TRIMMED_RIGHT_DELIM) {
            self.advance(rest.len() - trimmed.len() + TRIMMED_RIGHT_DELIM.len());
            self.trim_next = true;
            return Ok(());
        }

        Err(self.error("comment ends before closing delimiter"))
    }

    fn lex_action(&mut self) -> Result<(), TemplateError> {
        loop {
            let rest = self.rest();
            let space = rest.len() - rest.trim_start_matches(is_trim_space).len();
            self.advance(space);

            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return Err(self.error("unclosed action"));
            };

            if rest.starts_with(RIGHT_DELIM) {
                self.emit(TokenKind::RightDelim);
                self.advance(RIGHT_DELIM.len());
                return Ok(());
            }
            if space > 0 && rest.starts_with(TRIMMED_RIGHT_DELIM) {
                self.emit(TokenKind::RightDelim);
                self.advance(TRIMMED_RIGHT_DELIM.len());
                self.trim_next = true;
                return Ok(());
            }

            match c {
                '"' => self.lex_quote()?,
                '`' => self.lex_raw_quote()?,
                '|' => self.single(TokenKind::Pipe),
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                ',' => self.single(TokenKind::Comma),
                '=' => self.single(TokenKind::Assign),
                ':' => {
                    if !rest.starts_with(":=") {
                        return Err(self.error("expected :="));
                    }
                    self.emit(TokenKind::Declare);
                    self.advance(2);
                }
                '.' => {
                    if rest[1..].starts_with(is_ident_start) {
                        let path = self.lex_chain();
                        self.emit(TokenKind::Field(path));
                    } else {
                        self.single(TokenKind::Dot);
                    }
                }
                '$' => {
                    let len = ident_len(&rest[1..]);
                    let name = rest[..1 + len].to_string();
                    self.advance(1 + len);
                    let path = self.lex_chain();
                    self.emit(TokenKind::Variable(name, path));
                }
                c if c.is_ascii_digit()
                    || ((c == '-' || c == '+') && rest[1..].starts_with(|d: char| d.is_ascii_digit())) =>
                {
                    self.lex_number()?
                }
                c if is_ident_start(c) => {
                    let len = ident_len(rest);
                    self.emit(TokenKind::Ident(rest[..len].to_string()));
                    self.advance(len);
                }
                c => return Err(self.error(format!("unexpected {:?} in command", c))),
            }
        }
    }

    fn single(&mut self, kind: TokenKind) {
        self.emit(kind);
        self.advance(1);
    }

    /// Consume `.a.b...` starting at the current position.
    fn lex_chain(&mut self) -> Vec<String> {
        let mut path = Vec::new();
        loop {
            let rest = self.rest();
            if !(rest.starts_with('.') && rest[1..].starts_with(is_ident_start)) {
                return path;
            }
            let len = ident_len(&rest[1..]);
            path.push(rest[1..1 + len].to_string());
            self.advance(1 + len);
        }
    }

    fn lex_number(&mut self) -> Result<(), TemplateError> {
        let rest = self.rest();
        let sign = usize::from(rest.starts_with(['-', '+']));
        let digits = rest[sign..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - sign);
        let end = sign + digits;

        if let Some(c) = rest[end..].chars().next().filter(|c| is_ident_char(*c)) {
            let bad = end + c.len_utf8();
            return Err(self.error(format!("bad number syntax: {:?}", &rest[..bad])));
        }

        let value: i64 = rest[..end]
            .parse()
            .map_err(|_| self.error(format!("bad number syntax: {:?}", &rest[..end])))?;
        self.emit(TokenKind::Int(value));
        self.advance(end);
        Ok(())
    }

    fn lex_quote(&mut self) -> Result<(), TemplateError> {
        let rest = self.rest();
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.emit(TokenKind::Str(value));
                    self.advance(i + 1);
                    return Ok(());
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) if other != '\n' => {
                        return Err(self.error(format!("invalid escape \\{}", other)))
                    }
                    _ => break,
                },
                '\n' => break,
                c => value.push(c),
            }
        }

        Err(self.error("unterminated quoted string"))
    }

    fn lex_raw_quote(&mut self) -> Result<(), TemplateError> {
        let rest = self.rest();
        let Some(end) = rest[1..].find('`') else {
            return Err(self.error("unterminated raw quoted string"));
        };
        self.emit(TokenKind::Str(rest[1..1 + end].to_string()));
        self.advance(end + 2);
        Ok(())
    }
}
