//! # Script Parser
//!
//! Parses the host's cell-structured script format.
//!
//! A script is a sequence of cells separated by `# %%` lines, one
//! statement per line. The statement forms are assignment, augmented
//! assignment (`+=`, `-=`, `*=`), element assignment (`xs[i] = e`,
//! `m["k"] = e`), deletion (`del x`, `del xs[i]`), method calls
//! (`xs.append(e)`), `print(...)`, and bare expressions. Expressions are
//! integer and string literals, names, element access, list and map
//! literals, `+ - *` arithmetic, and the builtins `len`, `sum`, and
//! `list` (shallow copy).
//!
//! Parsing also derives each statement's static read and write sets,
//! which seed the engine's liveness analysis for cells that have never
//! run.

use super::HostError;
use freshet_core::StatementInfo;
use std::collections::BTreeSet;

// =============================================================================
// AST
// =============================================================================

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+` (also string concatenation).
    Add,
    /// `-`.
    Sub,
    /// `*`.
    Mul,
}

/// Single-argument builtin functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `len(x)`: element count of a list, map, or string.
    Len,
    /// `sum(xs)`: sum of an integer list, reading every element.
    Sum,
    /// `list(xs)`: shallow copy of a list, reading every element.
    Copy,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// String literal.
    Str(String),
    /// Name read.
    Name(String),
    /// Element access on a named container.
    Index {
        /// The container's name.
        base: String,
        /// The position or key expression.
        key: Box<Expr>,
    },
    /// List literal.
    List(Vec<Expr>),
    /// Map literal with string keys.
    Map(Vec<(String, Expr)>),
    /// Binary arithmetic.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Builtin call.
    Call {
        /// Which builtin.
        func: Builtin,
        /// The single argument.
        arg: Box<Expr>,
    },
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `x = e`.
    Assign {
        /// Target name.
        target: String,
        /// Value expression.
        value: Expr,
    },
    /// `x += e` and friends.
    AugAssign {
        /// Target name, read then rebound.
        target: String,
        /// The operator.
        op: BinOp,
        /// Right-hand side.
        value: Expr,
    },
    /// `xs[i] = e` or `m["k"] = e`.
    SetElement {
        /// The container's name.
        base: String,
        /// The position or key expression.
        key: Expr,
        /// Value expression.
        value: Expr,
    },
    /// `del x`.
    DelName {
        /// The name to unbind.
        name: String,
    },
    /// `del xs[i]` or `del m["k"]`.
    DelElement {
        /// The container's name.
        base: String,
        /// The position or key expression.
        key: Expr,
    },
    /// `recv.method(args)` as a statement.
    MethodCall {
        /// Receiver name.
        receiver: String,
        /// Method name.
        method: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// `print(args)`.
    Print {
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// A bare expression evaluated for its reads.
    Bare {
        /// The expression.
        value: Expr,
    },
}

impl Expr {
    fn collect_names(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Int(_) | Self::Str(_) => {}
            Self::Name(name) => {
                out.insert(name.clone());
            }
            Self::Index { base, key } => {
                out.insert(base.clone());
                key.collect_names(out);
            }
            Self::List(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
            Self::Map(pairs) => {
                for (_, value) in pairs {
                    value.collect_names(out);
                }
            }
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_names(out);
                rhs.collect_names(out);
            }
            Self::Call { arg, .. } => arg.collect_names(out),
        }
    }
}

impl Stmt {
    /// Names this statement reads.
    #[must_use]
    pub fn reads(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match self {
            Self::Assign { value, .. } => value.collect_names(&mut out),
            Self::AugAssign { target, value, .. } => {
                out.insert(target.clone());
                value.collect_names(&mut out);
            }
            Self::SetElement { base, key, value } => {
                out.insert(base.clone());
                key.collect_names(&mut out);
                value.collect_names(&mut out);
            }
            Self::DelName { .. } => {}
            Self::DelElement { base, key } => {
                out.insert(base.clone());
                key.collect_names(&mut out);
            }
            Self::MethodCall { receiver, args, .. } => {
                out.insert(receiver.clone());
                for arg in args {
                    arg.collect_names(&mut out);
                }
            }
            Self::Print { args } => {
                for arg in args {
                    arg.collect_names(&mut out);
                }
            }
            Self::Bare { value } => value.collect_names(&mut out),
        }
        out
    }

    /// Names this statement writes or unbinds.
    #[must_use]
    pub fn writes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match self {
            Self::Assign { target, .. } | Self::AugAssign { target, .. } => {
                out.insert(target.clone());
            }
            Self::SetElement { base, .. } => {
                out.insert(base.clone());
            }
            Self::DelName { name } => {
                out.insert(name.clone());
            }
            Self::DelElement { base, .. } => {
                out.insert(base.clone());
            }
            Self::MethodCall { receiver, .. } => {
                out.insert(receiver.clone());
            }
            Self::Print { .. } | Self::Bare { .. } => {}
        }
        out
    }
}

// =============================================================================
// PARSED PROGRAM
// =============================================================================

/// One statement with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    /// The trimmed source line.
    pub source: String,
    /// The parsed form.
    pub stmt: Stmt,
}

impl ParsedStatement {
    /// The engine-facing view: source plus static read/write sets.
    #[must_use]
    pub fn info(&self) -> StatementInfo {
        StatementInfo::new(
            self.source.clone(),
            self.stmt.reads().into_iter().collect(),
            self.stmt.writes().into_iter().collect(),
        )
    }
}

/// One cell's worth of parsed statements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCell {
    /// Statements in source order.
    pub statements: Vec<ParsedStatement>,
}

impl ParsedCell {
    /// Engine-facing statement infos in order.
    #[must_use]
    pub fn infos(&self) -> Vec<StatementInfo> {
        self.statements.iter().map(ParsedStatement::info).collect()
    }
}

/// Split a script on `# %%` separator lines and parse every statement.
///
/// Blank lines and comment-only lines are skipped; cells that end up
/// empty are dropped. Content before the first separator belongs to the
/// first cell.
pub fn parse_script(source: &str) -> Result<Vec<ParsedCell>, HostError> {
    let mut cells = Vec::new();
    let mut current = ParsedCell::default();

    for (offset, raw) in source.lines().enumerate() {
        let line_no = offset + 1;
        let trimmed = raw.trim();
        if trimmed.starts_with("# %%") {
            if !current.statements.is_empty() {
                cells.push(std::mem::take(&mut current));
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        let toks = lex(trimmed, line_no)?;
        if toks.is_empty() {
            // comment-only line
            continue;
        }
        let stmt = Parser::run(toks, line_no)?;
        current.statements.push(ParsedStatement {
            source: trimmed.to_string(),
            stmt,
        });
    }
    if !current.statements.is_empty() {
        cells.push(current);
    }
    Ok(cells)
}

// =============================================================================
// LEXER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Int(i64),
    Str(String),
    Ident(String),
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    Plus,
    Minus,
    Star,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
}

fn label(tok: &Tok) -> String {
    match tok {
        Tok::Int(n) => format!("`{n}`"),
        Tok::Str(_) => "a string literal".to_string(),
        Tok::Ident(name) => format!("`{name}`"),
        Tok::Assign => "`=`".to_string(),
        Tok::PlusEq => "`+=`".to_string(),
        Tok::MinusEq => "`-=`".to_string(),
        Tok::StarEq => "`*=`".to_string(),
        Tok::Plus => "`+`".to_string(),
        Tok::Minus => "`-`".to_string(),
        Tok::Star => "`*`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::LBrace => "`{`".to_string(),
        Tok::RBrace => "`}`".to_string(),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Colon => "`:`".to_string(),
        Tok::Dot => "`.`".to_string(),
    }
}

fn lex(line: &str, line_no: usize) -> Result<Vec<Tok>, HostError> {
    let err = |message: String| HostError::Parse {
        line: line_no,
        message,
    };
    let mut toks = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '#' => break,
            '0'..='9' => {
                let mut value: i64 = 0;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(i64::from(d)))
                        .ok_or_else(|| err("integer literal too large".to_string()))?;
                    chars.next();
                }
                toks.push(Tok::Int(value));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            other => {
                                return Err(err(format!(
                                    "unknown escape `\\{}`",
                                    other.map_or(String::new(), |c| c.to_string())
                                )));
                            }
                        },
                        Some(c) => text.push(c),
                        None => return Err(err("unterminated string literal".to_string())),
                    }
                }
                toks.push(Tok::Str(text));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(name));
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    return Err(err("comparison operators are not supported".to_string()));
                }
                toks.push(Tok::Assign);
            }
            '+' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::PlusEq);
                } else {
                    toks.push(Tok::Plus);
                }
            }
            '-' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::MinusEq);
                } else {
                    toks.push(Tok::Minus);
                }
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::StarEq);
                } else {
                    toks.push(Tok::Star);
                }
            }
            '[' => {
                chars.next();
                toks.push(Tok::LBracket);
            }
            ']' => {
                chars.next();
                toks.push(Tok::RBracket);
            }
            '{' => {
                chars.next();
                toks.push(Tok::LBrace);
            }
            '}' => {
                chars.next();
                toks.push(Tok::RBrace);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            ':' => {
                chars.next();
                toks.push(Tok::Colon);
            }
            '.' => {
                chars.next();
                toks.push(Tok::Dot);
            }
            other => return Err(err(format!("unexpected character `{other}`"))),
        }
    }
    Ok(toks)
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn run(toks: Vec<Tok>, line: usize) -> Result<Stmt, HostError> {
        let mut parser = Self { toks, pos: 0, line };
        let stmt = parser.statement()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.err(format!("unexpected {} after statement", label(tok))));
        }
        Ok(stmt)
    }

    fn err(&self, message: String) -> HostError {
        HostError::Parse {
            line: self.line,
            message,
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.toks.get(self.pos + ahead)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), HostError> {
        if self.eat(tok) {
            Ok(())
        } else {
            let found = self.peek().map_or("but the line ended".to_string(), |t| {
                format!("found {}", label(t))
            });
            Err(self.err(format!("expected {}, {found}", label(tok))))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, HostError> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            Some(tok) => Err(self.err(format!("expected {what}, found {}", label(&tok)))),
            None => Err(self.err(format!("expected {what}"))),
        }
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(name)) if name == word)
    }

    fn statement(&mut self) -> Result<Stmt, HostError> {
        // del x / del xs[i]
        if self.peek_keyword("del") {
            self.pos += 1;
            let name = self.expect_ident("a name after `del`")?;
            if self.eat(&Tok::LBracket) {
                let key = self.expr()?;
                self.expect(&Tok::RBracket)?;
                return Ok(Stmt::DelElement { base: name, key });
            }
            return Ok(Stmt::DelName { name });
        }

        // print(...)
        if self.peek_keyword("print") && self.peek_at(1) == Some(&Tok::LParen) {
            self.pos += 2;
            let args = self.call_args()?;
            return Ok(Stmt::Print { args });
        }

        // recv.method(...)
        if matches!(self.peek(), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Dot) {
            let receiver = self.expect_ident("a name")?;
            self.pos += 1; // the dot
            let method = self.expect_ident("a method name after `.`")?;
            self.expect(&Tok::LParen)?;
            let args = self.call_args()?;
            return Ok(Stmt::MethodCall {
                receiver,
                method,
                args,
            });
        }

        // name = e / name op= e
        if matches!(self.peek(), Some(Tok::Ident(_))) {
            let op = match self.peek_at(1) {
                Some(Tok::Assign) => Some(None),
                Some(Tok::PlusEq) => Some(Some(BinOp::Add)),
                Some(Tok::MinusEq) => Some(Some(BinOp::Sub)),
                Some(Tok::StarEq) => Some(Some(BinOp::Mul)),
                _ => None,
            };
            if let Some(op) = op {
                let target = self.expect_ident("a name")?;
                self.pos += 1; // the operator
                let value = self.expr()?;
                return Ok(match op {
                    None => Stmt::Assign { target, value },
                    Some(op) => Stmt::AugAssign { target, op, value },
                });
            }
        }

        // element assignment or bare expression
        let value = self.expr()?;
        if self.eat(&Tok::Assign) {
            let Expr::Index { base, key } = value else {
                return Err(self.err("invalid assignment target".to_string()));
            };
            let rhs = self.expr()?;
            return Ok(Stmt::SetElement {
                base,
                key: *key,
                value: rhs,
            });
        }
        Ok(Stmt::Bare { value })
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, HostError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(&Tok::RParen)?;
            return Ok(args);
        }
    }

    fn expr(&mut self) -> Result<Expr, HostError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, HostError> {
        let mut lhs = self.factor()?;
        while self.eat(&Tok::Star) {
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op: BinOp::Mul,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, HostError> {
        match self.next() {
            Some(Tok::Int(n)) => Ok(Expr::Int(n)),
            Some(Tok::Minus) => match self.next() {
                Some(Tok::Int(n)) => Ok(Expr::Int(-n)),
                _ => Err(self.err("expected an integer after unary `-`".to_string())),
            },
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(name)) => {
                if self.eat(&Tok::LParen) {
                    let func = match name.as_str() {
                        "len" => Builtin::Len,
                        "sum" => Builtin::Sum,
                        "list" => Builtin::Copy,
                        _ => return Err(self.err(format!("unknown function `{name}`"))),
                    };
                    let arg = self.expr()?;
                    if self.peek() == Some(&Tok::Comma) {
                        return Err(self.err(format!("`{name}` takes exactly one argument")));
                    }
                    self.expect(&Tok::RParen)?;
                    return Ok(Expr::Call {
                        func,
                        arg: Box::new(arg),
                    });
                }
                if self.eat(&Tok::LBracket) {
                    let key = self.expr()?;
                    self.expect(&Tok::RBracket)?;
                    return Ok(Expr::Index {
                        base: name,
                        key: Box::new(key),
                    });
                }
                Ok(Expr::Name(name))
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expr()?);
                    if self.eat(&Tok::Comma) {
                        continue;
                    }
                    self.expect(&Tok::RBracket)?;
                    return Ok(Expr::List(items));
                }
            }
            Some(Tok::LBrace) => {
                let mut pairs = Vec::new();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Map(pairs));
                }
                loop {
                    let key = match self.next() {
                        Some(Tok::Str(s)) => s,
                        _ => {
                            return Err(
                                self.err("map keys must be string literals".to_string())
                            );
                        }
                    };
                    self.expect(&Tok::Colon)?;
                    let value = self.expr()?;
                    pairs.push((key, value));
                    if self.eat(&Tok::Comma) {
                        continue;
                    }
                    self.expect(&Tok::RBrace)?;
                    return Ok(Expr::Map(pairs));
                }
            }
            Some(tok) => Err(self.err(format!("expected an expression, found {}", label(&tok)))),
            None => Err(self.err("expected an expression".to_string())),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> Stmt {
        let cells = parse_script(line).expect("parse");
        assert_eq!(cells.len(), 1, "expected one cell");
        assert_eq!(cells[0].statements.len(), 1, "expected one statement");
        cells[0].statements[0].stmt.clone()
    }

    #[test]
    fn assignment_forms() {
        assert_eq!(
            one("x = 1"),
            Stmt::Assign {
                target: "x".to_string(),
                value: Expr::Int(1),
            }
        );
        assert_eq!(
            one("x += y * 2"),
            Stmt::AugAssign {
                target: "x".to_string(),
                op: BinOp::Add,
                value: Expr::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(Expr::Name("y".to_string())),
                    rhs: Box::new(Expr::Int(2)),
                },
            }
        );
        assert_eq!(
            one("xs[0] = -5"),
            Stmt::SetElement {
                base: "xs".to_string(),
                key: Expr::Int(0),
                value: Expr::Int(-5),
            }
        );
    }

    #[test]
    fn precedence_binds_star_tighter() {
        assert_eq!(
            one("r = 1 + 2 * 3"),
            Stmt::Assign {
                target: "r".to_string(),
                value: Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Int(1)),
                    rhs: Box::new(Expr::Binary {
                        op: BinOp::Mul,
                        lhs: Box::new(Expr::Int(2)),
                        rhs: Box::new(Expr::Int(3)),
                    }),
                },
            }
        );
    }

    #[test]
    fn deletion_and_method_calls() {
        assert_eq!(
            one("del x"),
            Stmt::DelName {
                name: "x".to_string()
            }
        );
        assert_eq!(
            one("del m[\"k\"]"),
            Stmt::DelElement {
                base: "m".to_string(),
                key: Expr::Str("k".to_string()),
            }
        );
        assert_eq!(
            one("xs.insert(0, y)"),
            Stmt::MethodCall {
                receiver: "xs".to_string(),
                method: "insert".to_string(),
                args: vec![Expr::Int(0), Expr::Name("y".to_string())],
            }
        );
    }

    #[test]
    fn literals_and_builtins() {
        assert_eq!(
            one("m = {\"a\": 1, \"b\": x}"),
            Stmt::Assign {
                target: "m".to_string(),
                value: Expr::Map(vec![
                    ("a".to_string(), Expr::Int(1)),
                    ("b".to_string(), Expr::Name("x".to_string())),
                ]),
            }
        );
        assert_eq!(
            one("n = len(xs) + sum(ys)"),
            Stmt::Assign {
                target: "n".to_string(),
                value: Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Call {
                        func: Builtin::Len,
                        arg: Box::new(Expr::Name("xs".to_string())),
                    }),
                    rhs: Box::new(Expr::Call {
                        func: Builtin::Sum,
                        arg: Box::new(Expr::Name("ys".to_string())),
                    }),
                },
            }
        );
    }

    #[test]
    fn cell_splitting_skips_blanks_and_comments() {
        let script = "x = 1\n\n# a comment\n# %%\ny = x\n# %% second\nz = y\n";
        let cells = parse_script(script).expect("parse");
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0].statements[0].source, "x = 1");
        assert_eq!(cells[1].statements[0].source, "y = x");
        assert_eq!(cells[2].statements[0].source, "z = y");
    }

    #[test]
    fn reads_and_writes_cover_every_form() {
        let reads = |line: &str| {
            one(line)
                .reads()
                .into_iter()
                .collect::<Vec<_>>()
        };
        let writes = |line: &str| {
            one(line)
                .writes()
                .into_iter()
                .collect::<Vec<_>>()
        };

        assert_eq!(reads("y = x + z"), vec!["x", "z"]);
        assert_eq!(writes("y = x + z"), vec!["y"]);
        assert_eq!(reads("x += 1"), vec!["x"]);
        assert_eq!(reads("xs[i] = v"), vec!["i", "v", "xs"]);
        assert_eq!(writes("xs[i] = v"), vec!["xs"]);
        assert_eq!(writes("del x"), vec!["x"]);
        assert_eq!(reads("xs.append(y)"), vec!["xs", "y"]);
        assert_eq!(writes("xs.append(y)"), vec!["xs"]);
        assert_eq!(reads("print(a, b)"), vec!["a", "b"]);
        assert!(writes("print(a, b)").is_empty());
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let script = "x = 1\ny = 2 +\n";
        let err = parse_script(script).expect_err("should fail");
        assert!(matches!(err, HostError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse_script("x == 1").is_err());
        assert!(parse_script("x = foo(1)").is_err());
        assert!(parse_script("1 = x").is_err());
        assert!(parse_script("m = {1: 2}").is_err());
        assert!(parse_script("x = \"unterminated").is_err());
    }
}
