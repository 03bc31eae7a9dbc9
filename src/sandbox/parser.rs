//! Recursive-descent parser for reward scripts.
//!
//! Operator precedence follows the usual scripting-language rules, lowest to
//! highest: conditional expression, `or`, `and`, `not`, comparisons (chained),
//! `+ -`, `* / // %`, unary `+ -`, `**` (right associative), then calls,
//! subscripts and attribute access.

use crate::error::SandboxError;

use super::interpreter::MAX_EXPRESSION_DEPTH;
use super::lexer::{tokenize, Keyword, Punct, Token, TokenKind};

/// A parsed script. Imports and docstrings leave no trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
}

impl Program {
    /// Looks up a top-level function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

impl FunctionDef {
    /// Whether any `return` appears in the body, including nested branches.
    pub fn has_return(&self) -> bool {
        fn block_returns(block: &[Stmt]) -> bool {
            block.iter().any(|stmt| match stmt {
                Stmt::Return { .. } => true,
                Stmt::If {
                    branches, orelse, ..
                } => branches.iter().any(|(_, body)| block_returns(body)) || block_returns(orelse),
                _ => false,
            })
        }
        block_returns(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Target,
        value: Expr,
        line: usize,
    },
    AugAssign {
        name: String,
        op: BinOp,
        value: Expr,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
        line: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
    },
    Pass,
    Expr(Expr),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
}

/// Modules that scripts may import. Imports are accepted and ignored since
/// both are always in scope.
const IMPORTABLE: [&str; 3] = ["math", "numpy", "np"];

/// Parses a full script into functions.
pub fn parse(source: &str) -> Result<Program, SandboxError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        in_expression: false,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open blocks plus open sub-expressions at the current position.
    depth: usize,
    in_expression: bool,
}

impl Parser {
    fn program(&mut self) -> Result<Program, SandboxError> {
        let mut functions: Vec<FunctionDef> = Vec::new();

        while !self.at(&TokenKind::Eof) {
            let line = self.line();
            match self.peek().clone() {
                TokenKind::Keyword(Keyword::Def) => {
                    let func = self.function_def()?;
                    if functions.iter().any(|f| f.name == func.name) {
                        return Err(SandboxError::DuplicateFunction(func.name));
                    }
                    functions.push(func);
                }
                TokenKind::Keyword(Keyword::Import) => self.import()?,
                TokenKind::Str(_) => {
                    // Module docstring.
                    self.advance();
                    self.expect_line_end()?;
                }
                TokenKind::Newline => self.advance(),
                _ => return Err(SandboxError::UnsupportedStatement(line)),
            }
        }

        Ok(Program { functions })
    }

    fn import(&mut self) -> Result<(), SandboxError> {
        self.advance();
        loop {
            let module = self.expect_name()?;
            if !IMPORTABLE.contains(&module.as_str()) {
                return Err(self.error(&format!("module '{}' is not available", module)));
            }
            if self.eat(&TokenKind::Keyword(Keyword::As)) {
                self.expect_name()?;
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_line_end()
    }

    fn function_def(&mut self) -> Result<FunctionDef, SandboxError> {
        let line = self.line();
        self.advance();
        let name = self.expect_name()?;
        self.expect_punct(Punct::LParen)?;

        let mut params = Vec::new();
        while !self.at_punct(Punct::RParen) {
            let param = self.expect_name()?;
            if params.contains(&param) {
                return Err(self.error(&format!("duplicate parameter '{}'", param)));
            }
            params.push(param);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::Colon)?;
        let body = self.block()?;

        Ok(FunctionDef {
            name,
            params,
            body,
            line,
        })
    }

    /// Parses the body after a `:`, either an indented suite or statements on
    /// the same line.
    fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        if !self.eat(&TokenKind::Newline) {
            return self.simple_statements();
        }

        if !self.eat(&TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("unexpected end of input in block"));
            }
            body.extend(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        match self.peek().clone() {
            TokenKind::Keyword(Keyword::If) => Ok(vec![self.if_statement()?]),
            TokenKind::Keyword(Keyword::Def) => Err(self.error("nested functions are not supported")),
            TokenKind::Keyword(Keyword::Import) => {
                self.import()?;
                Ok(Vec::new())
            }
            _ => self.simple_statements(),
        }
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_punct(Punct::Semicolon) {
            if self.at(&TokenKind::Newline) || self.at(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        self.expect_line_end()?;
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> Result<Stmt, SandboxError> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.expression_list()?)
                };
                Ok(Stmt::Return { value, line })
            }
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                Ok(Stmt::Pass)
            }
            _ => self.expression_statement(line),
        }
    }

    fn expression_statement(&mut self, line: usize) -> Result<Stmt, SandboxError> {
        let expr = self.expression_list()?;

        if self.eat_punct(Punct::Assign) {
            let target = to_target(expr).ok_or_else(|| self.error("cannot assign to expression"))?;
            let value = self.expression_list()?;
            if self.at_punct(Punct::Assign) {
                return Err(self.error("chained assignment is not supported"));
            }
            return Ok(Stmt::Assign {
                target,
                value,
                line,
            });
        }

        let aug = match self.peek() {
            TokenKind::Punct(Punct::PlusAssign) => Some(BinOp::Add),
            TokenKind::Punct(Punct::MinusAssign) => Some(BinOp::Sub),
            TokenKind::Punct(Punct::StarAssign) => Some(BinOp::Mul),
            TokenKind::Punct(Punct::SlashAssign) => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            let Expr::Name(name) = expr else {
                return Err(self.error("augmented assignment needs a plain name"));
            };
            let value = self.expression_list()?;
            return Ok(Stmt::AugAssign {
                name,
                op,
                value,
                line,
            });
        }

        Ok(Stmt::Expr(expr))
    }

    fn if_statement(&mut self) -> Result<Stmt, SandboxError> {
        let line = self.line();
        self.advance();

        let mut branches = Vec::new();
        let condition = self.expression()?;
        self.expect_punct(Punct::Colon)?;
        branches.push((condition, self.nested(Self::block)?));

        let mut orelse = Vec::new();
        loop {
            if self.eat(&TokenKind::Keyword(Keyword::Elif)) {
                let condition = self.expression()?;
                self.expect_punct(Punct::Colon)?;
                branches.push((condition, self.nested(Self::block)?));
            } else if self.eat(&TokenKind::Keyword(Keyword::Else)) {
                self.expect_punct(Punct::Colon)?;
                orelse = self.nested(Self::block)?;
                break;
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            orelse,
            line,
        })
    }

    /// Comma-separated expressions; more than one (or a trailing comma) makes a tuple.
    fn expression_list(&mut self) -> Result<Expr, SandboxError> {
        let first = self.expression()?;
        if !self.at_punct(Punct::Comma) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat_punct(Punct::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    /// Parses one expression and rejects trees deeper than
    /// [`MAX_EXPRESSION_DEPTH`], which evaluation could not walk safely.
    fn expression(&mut self) -> Result<Expr, SandboxError> {
        if self.in_expression {
            return self.nested(Self::conditional);
        }

        self.in_expression = true;
        let expr = self.nested(Self::conditional);
        self.in_expression = false;

        let expr = expr?;
        if expression_depth(&expr) > MAX_EXPRESSION_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(expr)
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Counts one more link of a left-associative chain such as `a + b + c`.
    fn extend_chain(&self, links: &mut usize) -> Result<(), SandboxError> {
        *links += 1;
        if *links > MAX_EXPRESSION_DEPTH {
            return Err(self.error("expression chain too long"));
        }
        Ok(())
    }

    fn conditional(&mut self) -> Result<Expr, SandboxError> {
        let expr = self.or_expr()?;
        if !self.eat(&TokenKind::Keyword(Keyword::If)) {
            return Ok(expr);
        }

        let condition = self.or_expr()?;
        if !self.eat(&TokenKind::Keyword(Keyword::Else)) {
            return Err(self.error("expected 'else' in conditional expression"));
        }
        let orelse = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(expr),
            orelse: Box::new(orelse),
        })
    }

    fn or_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::Keyword(Keyword::Or)) {
            self.extend_chain(&mut links)?;
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::Keyword(Keyword::And)) {
            self.extend_chain(&mut links)?;
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&TokenKind::Keyword(Keyword::Not)) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SandboxError> {
        let first = self.arith()?;
        let mut rest = Vec::new();

        let mut links = 0;
        while let Some(op) = self.comparison_op() {
            self.extend_chain(&mut links)?;
            rest.push((op, self.arith()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    /// Consumes a comparison operator if one is next.
    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().clone() {
            TokenKind::Punct(Punct::Eq) => CmpOp::Eq,
            TokenKind::Punct(Punct::NotEq) => CmpOp::NotEq,
            TokenKind::Punct(Punct::Lt) => CmpOp::Lt,
            TokenKind::Punct(Punct::LtEq) => CmpOp::LtEq,
            TokenKind::Punct(Punct::Gt) => CmpOp::Gt,
            TokenKind::Punct(Punct::GtEq) => CmpOp::GtEq,
            TokenKind::Keyword(Keyword::In) => CmpOp::In,
            TokenKind::Keyword(Keyword::Not)
                if self.peek_at(1) == &TokenKind::Keyword(Keyword::In) =>
            {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Keyword(Keyword::Is) => {
                if self.peek_at(1) == &TokenKind::Keyword(Keyword::Not) {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn arith(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Punct(Punct::Plus) => BinOp::Add,
                TokenKind::Punct(Punct::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            self.extend_chain(&mut links)?;
            let right = self.term()?;
            left = binary(op, left, right);
        }
    }

    fn term(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.factor()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Punct(Punct::Star) => BinOp::Mul,
                TokenKind::Punct(Punct::Slash) => BinOp::Div,
                TokenKind::Punct(Punct::DoubleSlash) => BinOp::FloorDiv,
                TokenKind::Punct(Punct::Percent) => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            self.extend_chain(&mut links)?;
            let right = self.factor()?;
            left = binary(op, left, right);
        }
    }

    fn factor(&mut self) -> Result<Expr, SandboxError> {
        let op = match self.peek() {
            TokenKind::Punct(Punct::Minus) => UnaryOp::Neg,
            TokenKind::Punct(Punct::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Self::factor)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, SandboxError> {
        let base = self.postfix()?;
        if self.eat_punct(Punct::DoubleStar) {
            // Right operand may itself be unary: 2 ** -1.
            let exponent = self.nested(Self::factor)?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if self.at_punct(Punct::LParen)
                || self.at_punct(Punct::LBracket)
                || self.at_punct(Punct::Dot)
            {
                self.extend_chain(&mut links)?;
            }
            if self.eat_punct(Punct::LParen) {
                let args = self.call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_punct(Punct::LBracket) {
                expr = self.subscript(expr)?;
            } else if self.eat_punct(Punct::Dot) {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>, SandboxError> {
        let mut args = Vec::new();
        while !self.at_punct(Punct::RParen) {
            if matches!(self.peek(), TokenKind::Name(_))
                && self.peek_at(1) == &TokenKind::Punct(Punct::Assign)
            {
                return Err(self.error("keyword arguments are not supported"));
            }
            args.push(self.expression()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(args)
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr, SandboxError> {
        let lower = if self.at_punct(Punct::Colon) {
            None
        } else {
            Some(self.expression_list()?)
        };

        if !self.eat_punct(Punct::Colon) {
            self.expect_punct(Punct::RBracket)?;
            let index = lower.ok_or_else(|| self.error("empty subscript"))?;
            return Ok(Expr::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            });
        }

        let upper = if self.at_punct(Punct::RBracket) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect_punct(Punct::RBracket)?;
        Ok(Expr::Slice {
            value: Box::new(value),
            lower: lower.map(Box::new),
            upper,
        })
    }

    fn atom(&mut self) -> Result<Expr, SandboxError> {
        let token = self.peek().clone();
        match token {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                let mut text = s;
                // Adjacent literals concatenate.
                while let TokenKind::Str(next) = self.peek() {
                    text.push_str(next);
                    self.advance();
                }
                Ok(Expr::Str(text))
            }
            TokenKind::Name(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                Ok(Expr::None)
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                if self.eat_punct(Punct::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let inner = self.expression_list()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                while !self.at_punct(Punct::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::RBracket)?;
                Ok(Expr::List(items))
            }
            other => Err(self.error(&format!("unexpected {}", describe(&other)))),
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_punct(&self, punct: Punct) -> bool {
        self.at(&TokenKind::Punct(punct))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        self.eat(&TokenKind::Punct(punct))
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<(), SandboxError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {:?}, found {}",
                punct,
                describe(self.peek())
            )))
        }
    }

    fn expect_name(&mut self) -> Result<String, SandboxError> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected a name, found {}", describe(&other)))),
        }
    }

    fn expect_line_end(&mut self) -> Result<(), SandboxError> {
        if self.eat(&TokenKind::Newline) || self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected end of line, found {}",
                describe(self.peek())
            )))
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Punct(Punct::Semicolon)
        )
    }

    /// Tokens that may follow a trailing comma in an expression list.
    fn at_expression_end(&self) -> bool {
        self.at_statement_end()
            || matches!(
                self.peek(),
                TokenKind::Punct(
                    Punct::RParen | Punct::RBracket | Punct::Assign | Punct::Colon
                )
            )
    }

    fn error(&self, message: &str) -> SandboxError {
        SandboxError::Syntax {
            line: self.line(),
            message: message.to_string(),
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Height of an expression tree, measured without recursion.
fn expression_depth<'a>(root: &'a Expr) -> usize {
    let mut deepest = 0;
    let mut pending = vec![(root, 1)];
    while let Some((expr, depth)) = pending.pop() {
        deepest = deepest.max(depth);
        let mut push = |child: &'a Expr| pending.push((child, depth + 1));
        match expr {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None | Expr::Name(_) => {}
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(push),
            Expr::Unary { operand, .. } => push(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                push(left);
                push(right);
            }
            Expr::Compare { first, rest } => {
                push(first);
                rest.iter().for_each(|(_, e)| push(e));
            }
            Expr::Conditional {
                condition,
                then,
                orelse,
            } => {
                push(condition);
                push(then);
                push(orelse);
            }
            Expr::Call { func, args } => {
                push(func);
                args.iter().for_each(push);
            }
            Expr::Attribute { value, .. } => push(value),
            Expr::Subscript { value, index } => {
                push(value);
                push(index);
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                push(value);
                lower.iter().chain(upper.iter()).for_each(|e| push(e));
            }
        }
    }
    deepest
}

fn to_target(expr: Expr) -> Option<Target> {
    match expr {
        Expr::Name(name) => Some(Target::Name(name)),
        Expr::Tuple(items) | Expr::List(items) => items
            .into_iter()
            .map(to_target)
            .collect::<Option<Vec<_>>>()
            .map(Target::Tuple),
        _ => None,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Name(name) => format!("name '{}'", name),
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::Keyword(k) => format!("keyword {:?}", k),
        TokenKind::Punct(p) => format!("{:?}", p),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Indent => "indent".to_string(),
        TokenKind::Dedent => "dedent".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}
