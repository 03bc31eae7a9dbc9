//! Tokenizer for reward scripts.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and `Dedent`
//! tokens so the parser never looks at whitespace. Newlines inside brackets
//! and after a trailing backslash are joined into one logical line; blank and
//! comment-only lines produce nothing.

use crate::error::SandboxError;

/// Reserved words of the reward-script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Return,
    If,
    Elif,
    Else,
    And,
    Or,
    Not,
    In,
    Is,
    True,
    False,
    None,
    Pass,
    Import,
    As,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "def" => Keyword::Def,
            "return" => Keyword::Return,
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "True" => Keyword::True,
            "False" => Keyword::False,
            "None" => Keyword::None,
            "pass" => Keyword::Pass,
            "import" => Keyword::Import,
            "as" => Keyword::As,
            _ => return None,
        })
    }
}

/// Punctuation and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(f64),
    Str(String),
    Keyword(Keyword),
    Punct(Punct),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Two-character operators, checked before single characters.
const TWO_CHAR_PUNCT: [(&str, Punct); 10] = [
    ("**", Punct::DoubleStar),
    ("//", Punct::DoubleSlash),
    ("==", Punct::Eq),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("*=", Punct::StarAssign),
    ("/=", Punct::SlashAssign),
];

/// Tokenizes a complete reward script.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SandboxError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                if !self.handle_indentation()? {
                    continue;
                }
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\n' => {
                    if self.depth == 0 {
                        self.push_newline();
                        self.at_line_start = true;
                    }
                    self.pos += 1;
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '\'' | '"' => self.lex_string(c)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_name(),
                _ => self.lex_punct()?,
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of input inside brackets"));
        }
        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    /// Measures indentation at the start of a logical line.
    ///
    /// Returns `false` when the line was blank or a comment and has been
    /// consumed entirely.
    fn handle_indentation(&mut self) -> Result<bool, SandboxError> {
        let mut width = 0;
        while let Some(c) = self.chars.get(self.pos) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.chars.get(self.pos) {
            None => return Ok(false),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&top| top > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while self.chars.get(self.pos).is_some_and(|&c| c != '\n') {
            self.pos += 1;
        }
    }

    fn lex_number(&mut self) -> Result<(), SandboxError> {
        let start = self.pos;
        self.consume_digits();
        if self.chars.get(self.pos) == Some(&'.') {
            self.pos += 1;
            self.consume_digits();
        }
        if matches!(self.chars.get(self.pos), Some('e') | Some('E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.chars.get(self.pos), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                self.consume_digits();
            } else {
                self.pos = mark;
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error(&format!("invalid number literal '{}'", text)))?;
        self.push(TokenKind::Number(value));
        Ok(())
    }

    fn consume_digits(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == '_')
        {
            self.pos += 1;
        }
    }

    fn lex_name(&mut self) {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        let ident: String = self.chars[start..self.pos].iter().collect();
        let kind = match Keyword::from_ident(&ident) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Name(ident),
        };
        self.push(kind);
    }

    fn lex_string(&mut self, quote: char) -> Result<(), SandboxError> {
        let start_line = self.line;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut value = String::new();
        loop {
            let Some(&c) = self.chars.get(self.pos) else {
                self.line = start_line;
                return Err(self.error("unterminated string literal"));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            match c {
                '\n' if !triple => {
                    return Err(self.error("unterminated string literal"));
                }
                '\n' => {
                    self.line += 1;
                    value.push(c);
                    self.pos += 1;
                }
                '\\' => {
                    let escaped = self.peek(1);
                    self.pos += 2;
                    match escaped {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('\'') => value.push('\''),
                        Some('"') => value.push('"'),
                        Some('\n') => self.line += 1,
                        Some(other) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => {
                            return Err(self.error("unterminated string literal"));
                        }
                    }
                }
                _ => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }

        self.push_at(TokenKind::Str(value), start_line);
        Ok(())
    }

    fn lex_punct(&mut self) -> Result<(), SandboxError> {
        let c = self.chars[self.pos];
        if let Some(next) = self.peek(1) {
            let pair: String = [c, next].iter().collect();
            if let Some((_, punct)) = TWO_CHAR_PUNCT.iter().find(|(text, _)| *text == pair) {
                self.pos += 2;
                self.push(TokenKind::Punct(*punct));
                return Ok(());
            }
        }

        let punct = match c {
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '[' => Punct::LBracket,
            ']' => Punct::RBracket,
            ',' => Punct::Comma,
            ':' => Punct::Colon,
            ';' => Punct::Semicolon,
            '.' => Punct::Dot,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '=' => Punct::Assign,
            '<' => Punct::Lt,
            '>' => Punct::Gt,
            other => return Err(self.error(&format!("unexpected character '{}'", other))),
        };

        match punct {
            Punct::LParen | Punct::LBracket => self.depth += 1,
            Punct::RParen | Punct::RBracket => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| self.error(&format!("unmatched '{}'", c)))?;
            }
            _ => {}
        }

        self.pos += 1;
        self.push(TokenKind::Punct(punct));
        Ok(())
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        let line = self.line;
        self.push_at(kind, line);
    }

    fn push_at(&mut self, kind: TokenKind, line: usize) {
        self.tokens.push(Token { kind, line });
    }

    /// Ends a logical line unless nothing has been emitted since the last one.
    fn push_newline(&mut self) {
        match self.tokens.last() {
            None => {}
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                ) => {}
            Some(_) => self.push(TokenKind::Newline),
        }
    }

    fn error(&self, message: &str) -> SandboxError {
        SandboxError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }
}
