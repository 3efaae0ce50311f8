//! Parser for the general scripting form.
//!
//! Translated lines are tokenised and parsed one statement per line with a
//! hand-written cursor parser; [`parse_body`] then folds `if`/`else`/`end`
//! lines into a tree of [`Instruction`]s.
use std::path::Path;

use super::builtins::{Builtin, EditorMethod};
use crate::error::ScriptError;

const KEYWORDS: &[&str] = &[
    "if", "unless", "elsif", "else", "end", "and", "or", "not", "then", "do",
];

/// One line of script text with its source line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// One-based line number in the originating file.
    pub number: usize,
    /// Line content.
    pub text: String,
}

impl SourceLine {
    /// Pair `text` with its line number.
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// Binary operators. `and`/`or` share one precedence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `and` / `&&`.
    And,
    /// `or` / `||`.
    Or,
    /// `+`: string concatenation or integer addition.
    Add,
    /// `==`.
    Eq,
    /// `!=`.
    Ne,
}

/// Piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrPart {
    /// Literal text.
    Lit(String),
    /// `#{expr}`.
    Expr(Expr),
}

/// What a call invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// A runtime builtin.
    Builtin(Builtin),
    /// A method on a value, e.g. `@ef.write`.
    Method {
        /// Expression producing the receiver.
        receiver: Box<Expr>,
        /// Method to call.
        method: EditorMethod,
    },
}

/// A call with its evaluated-later arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Function or method.
    pub callee: Callee,
    /// Positional arguments.
    pub args: Vec<Expr>,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `nil`.
    Nil,
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// String without interpolation.
    Str(String),
    /// Double-quoted string with `#{}` parts.
    Interp(Vec<StrPart>),
    /// Backtick command; evaluates to its standard output.
    Shell(Vec<StrPart>),
    /// `@name`: a variable of the running unit.
    Ivar(String),
    /// `$name` that was never registered as a site variable.
    Global(String),
    /// `site['name']`.
    Site(String),
    /// Bare word: a local when bound, otherwise the word itself.
    Word(String),
    /// `[a, b]` or `%w{a b}`.
    List(Vec<Self>),
    /// `{k => v}`.
    Map(Vec<(Self, Self)>),
    /// `not x` / `!x`.
    Not(Box<Self>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Self>,
        /// Right operand.
        rhs: Box<Self>,
    },
    /// Function or method call.
    Call(Call),
}

impl Expr {
    fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// Destination of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `@name = …`.
    Ivar(String),
    /// `name = …`.
    Local(String),
    /// `site['name'] = …` (or an unregistered `$name = …`).
    Site(String),
}

/// A node of a compiled method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Store a value.
    Assign {
        /// Where to store it.
        target: Target,
        /// What to store.
        value: Expr,
        /// Source line.
        line: usize,
    },
    /// Call for effect.
    Call {
        /// The call.
        call: Call,
        /// Source line.
        line: usize,
    },
    /// Conditional block.
    If {
        /// Condition.
        cond: Expr,
        /// Taken when the condition is truthy.
        then: Vec<Self>,
        /// Taken otherwise.
        otherwise: Vec<Self>,
        /// Source line of the `if`.
        line: usize,
    },
}

impl Instruction {
    /// Source line this instruction came from.
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::Assign { line, .. } | Self::Call { line, .. } | Self::If { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawPart {
    Lit(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Ivar(String),
    Global(String),
    Int(i64),
    Single(String),
    Double(Vec<RawPart>),
    Shell(Vec<RawPart>),
    Words(Vec<String>),
    Punct(&'static str),
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{name}'"),
        Token::Ivar(name) => format!("'@{name}'"),
        Token::Global(name) => format!("'${name}'"),
        Token::Int(n) => format!("number {n}"),
        Token::Single(_) | Token::Double(_) => "string".to_string(),
        Token::Shell(_) => "shell command".to_string(),
        Token::Words(_) => "word list".to_string(),
        Token::Punct(p) => format!("'{p}'"),
    }
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
}

impl Lexer {
    fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            index: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if c.is_some() {
            self.index += 1;
        }
        c
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.current().filter(|c| pred(*c)) {
            out.push(c);
            self.index += 1;
        }
        out
    }

    fn tokens(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(c) = self.current() {
            match c {
                c if c.is_whitespace() => self.index += 1,
                '#' => break,
                '@' | '$' => {
                    self.index += 1;
                    let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
                    if name.is_empty() {
                        return Err(format!("expected a variable name after '{c}'"));
                    }
                    tokens.push(if c == '@' {
                        Token::Ivar(name)
                    } else {
                        Token::Global(name)
                    });
                }
                '\'' => {
                    self.index += 1;
                    tokens.push(Token::Single(self.single_quoted()?));
                }
                '"' => {
                    self.index += 1;
                    tokens.push(Token::Double(self.interpolated('"')?));
                }
                '`' => {
                    self.index += 1;
                    tokens.push(Token::Shell(self.interpolated('`')?));
                }
                '%' if self.peek(1) == Some('w') => {
                    self.index += 2;
                    tokens.push(Token::Words(self.word_list()?));
                }
                ':' if self.peek(1).is_some_and(|n| n.is_alphabetic() || n == '_') => {
                    self.index += 1;
                    tokens.push(Token::Single(self.identifier()));
                }
                c if c.is_ascii_digit() => tokens.push(Token::Int(self.number()?)),
                c if c.is_alphabetic() || c == '_' => tokens.push(Token::Ident(self.identifier())),
                _ => tokens.push(Token::Punct(self.punct()?)),
            }
        }
        Ok(tokens)
    }

    fn identifier(&mut self) -> String {
        let mut name = self.take_while(|c| c.is_alphanumeric() || c == '_');
        match self.current() {
            Some('?') => {
                self.index += 1;
                name.push('?');
            }
            Some('!') if self.peek(1) != Some('=') => {
                self.index += 1;
                name.push('!');
            }
            _ => {}
        }
        name
    }

    fn number(&mut self) -> Result<i64, String> {
        let digits = self
            .take_while(|c| c.is_ascii_digit() || c == '_')
            .replace('_', "");
        match digits.strip_prefix('0') {
            Some(octal) if !octal.is_empty() => {
                i64::from_str_radix(octal, 8).map_err(|_| format!("invalid octal number {digits}"))
            }
            _ => digits
                .parse()
                .map_err(|_| format!("invalid number {digits}")),
        }
    }

    fn single_quoted(&mut self) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err("unterminated string".to_string()),
                Some('\'') => return Ok(out),
                Some('\\') if matches!(self.current(), Some('\'' | '\\')) => {
                    out.extend(self.advance());
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn interpolated(&mut self, terminator: char) -> Result<Vec<RawPart>, String> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.advance() {
                None => return Err("unterminated string".to_string()),
                Some(c) if c == terminator => break,
                Some('\\') => match self.advance() {
                    Some('n') => lit.push('\n'),
                    Some('t') => lit.push('\t'),
                    Some(c @ ('"' | '\\' | '`' | '#')) => lit.push(c),
                    Some(c) => {
                        lit.push('\\');
                        lit.push(c);
                    }
                    None => return Err("unterminated string".to_string()),
                },
                Some('#') if self.current() == Some('{') => {
                    self.index += 1;
                    if !lit.is_empty() {
                        parts.push(RawPart::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(RawPart::Code(self.interpolation_code()?));
                }
                Some(c) => lit.push(c),
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawPart::Lit(lit));
        }
        Ok(parts)
    }

    fn interpolation_code(&mut self) -> Result<String, String> {
        let mut code = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.advance() else {
                return Err("unterminated interpolation".to_string());
            };
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '\'' | '"' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => return Ok(code),
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            code.push(c);
        }
    }

    fn word_list(&mut self) -> Result<Vec<String>, String> {
        let close = match self.advance() {
            Some('{') => '}',
            Some('(') => ')',
            Some('[') => ']',
            Some('<') => '>',
            _ => return Err("expected a delimiter after %w".to_string()),
        };
        let body = self.take_while(|c| c != close);
        if self.advance() != Some(close) {
            return Err("unterminated %w list".to_string());
        }
        Ok(body.split_whitespace().map(String::from).collect())
    }

    fn punct(&mut self) -> Result<&'static str, String> {
        const PAIRS: [&str; 5] = ["==", "!=", "=>", "&&", "||"];
        const SINGLES: [&str; 11] = ["(", ")", "[", "]", "{", "}", ",", ".", "=", "+", "!"];

        let c = self.current().unwrap_or_default();
        if let Some(next) = self.peek(1) {
            let pair: String = [c, next].iter().collect();
            if let Some(p) = PAIRS.iter().find(|p| **p == pair) {
                self.index += 2;
                return Ok(p);
            }
        }
        let single = c.to_string();
        if let Some(p) = SINGLES.iter().find(|p| **p == single) {
            self.index += 1;
            return Ok(p);
        }
        Err(format!("unexpected character '{c}'"))
    }
}

enum Statement {
    Blank,
    If(Expr),
    Elsif(Expr),
    Else,
    End,
    Simple(Instruction),
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: Lexer::new(text).tokens()?,
            index: 0,
        })
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.current(), Some(Token::Punct(p)) if *p == punct)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Some(Token::Ident(w)) if w == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        let found = self.at_punct(punct);
        if found {
            self.index += 1;
        }
        found
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), String> {
        if self.eat_punct(punct) {
            return Ok(());
        }
        match self.current() {
            Some(token) => Err(format!("expected '{punct}', found {}", describe(token))),
            None => Err(format!("expected '{punct}' before end of line")),
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.current() {
            Some(token) => Err(format!("unexpected {}", describe(token))),
            None => Ok(()),
        }
    }

    fn statement(&mut self, line: usize) -> Result<Statement, String> {
        let keyword = match self.current() {
            None => return Ok(Statement::Blank),
            Some(Token::Ident(w)) => w.clone(),
            Some(_) => String::new(),
        };
        let statement = match keyword.as_str() {
            "if" | "unless" | "elsif" => {
                self.index += 1;
                let mut cond = self.expr()?;
                if self.at_keyword("then") {
                    self.index += 1;
                }
                if keyword == "unless" {
                    cond = Expr::Not(Box::new(cond));
                }
                if keyword == "elsif" {
                    Statement::Elsif(cond)
                } else {
                    Statement::If(cond)
                }
            }
            "else" => {
                self.index += 1;
                Statement::Else
            }
            "end" => {
                self.index += 1;
                Statement::End
            }
            _ => Statement::Simple(self.simple(line)?),
        };
        self.finish()?;
        Ok(statement)
    }

    fn simple(&mut self, line: usize) -> Result<Instruction, String> {
        let instruction = if let Some(target) = self.assignment_target()? {
            Instruction::Assign {
                target,
                value: self.expr()?,
                line,
            }
        } else {
            match self.expr()? {
                Expr::Call(call) => Instruction::Call { call, line },
                Expr::Word(name) => return Err(format!("unknown function '{name}'")),
                _ => return Err("expression is not a statement".to_string()),
            }
        };
        self.modifier(instruction, line)
    }

    fn modifier(&mut self, instruction: Instruction, line: usize) -> Result<Instruction, String> {
        let negate = if self.at_keyword("if") {
            false
        } else if self.at_keyword("unless") {
            true
        } else {
            return Ok(instruction);
        };
        self.index += 1;
        let cond = self.expr()?;
        Ok(Instruction::If {
            cond: if negate { Expr::Not(Box::new(cond)) } else { cond },
            then: vec![instruction],
            otherwise: Vec::new(),
            line,
        })
    }

    fn assignment_target(&mut self) -> Result<Option<Target>, String> {
        let is_assign = |t: Option<&Token>| matches!(t, Some(Token::Punct("=")));
        let target = match (self.current(), self.peek(1)) {
            (Some(Token::Ivar(name)), next) if is_assign(next) => Target::Ivar(name.clone()),
            (Some(Token::Global(name)), next) if is_assign(next) => Target::Site(name.clone()),
            (Some(Token::Ident(name)), next)
                if is_assign(next)
                    && !KEYWORDS.contains(&name.as_str())
                    && !name.starts_with(|c: char| c.is_ascii_uppercase()) =>
            {
                Target::Local(name.clone())
            }
            (Some(Token::Ident(name)), Some(Token::Punct("[")))
                if name == "site" && is_assign(self.peek(4)) =>
            {
                self.index += 2;
                let key = self.site_key()?;
                self.expect_punct("]")?;
                self.expect_punct("=")?;
                return Ok(Some(Target::Site(key)));
            }
            _ => return Ok(None),
        };
        self.index += 2;
        Ok(Some(target))
    }

    fn site_key(&mut self) -> Result<String, String> {
        match self.advance() {
            Some(Token::Single(key)) => Ok(key),
            Some(Token::Double(parts)) => match parts.as_slice() {
                [RawPart::Lit(key)] => Ok(key.clone()),
                _ => Err("site[] needs a literal name".to_string()),
            },
            _ => Err("site[] needs a quoted name".to_string()),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.not_expr()?;
        loop {
            let op = if self.at_keyword("and") || self.at_punct("&&") {
                BinOp::And
            } else if self.at_keyword("or") || self.at_punct("||") {
                BinOp::Or
            } else {
                return Ok(lhs);
            };
            self.index += 1;
            let rhs = self.not_expr()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn not_expr(&mut self) -> Result<Expr, String> {
        if self.at_keyword("not") || self.at_punct("!") {
            self.index += 1;
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.sum()?;
        let op = if self.at_punct("==") {
            BinOp::Eq
        } else if self.at_punct("!=") {
            BinOp::Ne
        } else {
            return Ok(lhs);
        };
        self.index += 1;
        let rhs = self.sum()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.postfix()?;
        while self.eat_punct("+") {
            let rhs = self.postfix()?;
            lhs = Expr::binary(BinOp::Add, lhs, rhs);
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        while self.eat_punct(".") {
            let Some(Token::Ident(name)) = self.advance() else {
                return Err("expected a method name after '.'".to_string());
            };
            let method =
                EditorMethod::resolve(&name).ok_or_else(|| format!("unknown method '{name}'"))?;
            let args = self.arguments()?;
            expr = Expr::Call(Call {
                callee: Callee::Method {
                    receiver: Box::new(expr),
                    method,
                },
                args,
            });
        }
        Ok(expr)
    }

    fn starts_argument(&self) -> bool {
        match self.current() {
            Some(Token::Ident(w)) => !KEYWORDS.contains(&w.as_str()),
            Some(Token::Punct(p)) => matches!(*p, "[" | "{"),
            Some(_) => true,
            None => false,
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, String> {
        if self.eat_punct("(") {
            return self.list(")");
        }
        if !self.starts_argument() {
            return Ok(Vec::new());
        }
        let mut args = vec![self.sum()?];
        while self.eat_punct(",") {
            args.push(self.sum()?);
        }
        Ok(args)
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn list(&mut self, close: &str) -> Result<Vec<Expr>, String> {
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            items.push(self.expr()?);
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn map(&mut self) -> Result<Expr, String> {
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let key = self.sum()?;
            self.expect_punct("=>")?;
            let value = self.expr()?;
            entries.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Map(entries))
    }

    fn primary(&mut self) -> Result<Expr, String> {
        let Some(token) = self.advance() else {
            return Err("unexpected end of line".to_string());
        };
        match token {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Single(s) => Ok(Expr::Str(s)),
            Token::Double(parts) => {
                let mut parts = convert_parts(parts)?;
                if let [StrPart::Lit(s)] = parts.as_mut_slice() {
                    return Ok(Expr::Str(std::mem::take(s)));
                }
                Ok(Expr::Interp(parts))
            }
            Token::Shell(parts) => Ok(Expr::Shell(convert_parts(parts)?)),
            Token::Words(words) => Ok(Expr::List(words.into_iter().map(Expr::Str).collect())),
            Token::Ivar(name) => Ok(Expr::Ivar(name)),
            Token::Global(name) => Ok(Expr::Global(name)),
            Token::Punct("(") => {
                let inner = self.expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::List(self.list("]")?)),
            Token::Punct("{") => self.map(),
            Token::Ident(name) => self.identifier(name),
            other => Err(format!("unexpected {}", describe(&other))),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, String> {
        match name.as_str() {
            "true" => return Ok(Expr::Bool(true)),
            "false" => return Ok(Expr::Bool(false)),
            "nil" => return Ok(Expr::Nil),
            "site" if self.at_punct("[") => {
                self.index += 1;
                let key = self.site_key()?;
                self.expect_punct("]")?;
                return Ok(Expr::Site(key));
            }
            w if KEYWORDS.contains(&w) => return Err(format!("unexpected keyword '{w}'")),
            _ => {}
        }

        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            self.expect_punct(".")?;
            let Some(Token::Ident(method)) = self.advance() else {
                return Err(format!("expected a method name after '{name}.'"));
            };
            let builtin = Builtin::resolve(Some(&name), &method)
                .ok_or_else(|| format!("unknown function '{name}.{method}'"))?;
            let args = self.arguments()?;
            return Ok(Expr::Call(Call {
                callee: Callee::Builtin(builtin),
                args,
            }));
        }

        if let Some(builtin) = Builtin::resolve(None, &name) {
            let args = self.arguments()?;
            return Ok(Expr::Call(Call {
                callee: Callee::Builtin(builtin),
                args,
            }));
        }
        if self.at_punct("(") {
            return Err(format!("unknown function '{name}'"));
        }
        Ok(Expr::Word(name))
    }
}

fn convert_parts(parts: Vec<RawPart>) -> Result<Vec<StrPart>, String> {
    parts
        .into_iter()
        .map(|part| match part {
            RawPart::Lit(s) => Ok(StrPart::Lit(s)),
            RawPart::Code(code) => parse_expression(&code).map(StrPart::Expr),
        })
        .collect()
}

/// Parse a standalone expression, such as a translated guard.
///
/// # Errors
///
/// Returns a diagnostic when `text` is not exactly one expression.
pub fn parse_expression(text: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(text)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

struct Frame {
    cond: Expr,
    line: usize,
    then: Vec<Instruction>,
    otherwise: Vec<Instruction>,
    in_else: bool,
    /// Opened by `elsif`; closes together with its parent.
    chained: bool,
}

impl Frame {
    const fn new(cond: Expr, line: usize, chained: bool) -> Self {
        Self {
            cond,
            line,
            then: Vec::new(),
            otherwise: Vec::new(),
            in_else: false,
            chained,
        }
    }

    fn into_instruction(self) -> Instruction {
        Instruction::If {
            cond: self.cond,
            then: self.then,
            otherwise: self.otherwise,
            line: self.line,
        }
    }
}

fn open_block<'a>(root: &'a mut Vec<Instruction>, stack: &'a mut [Frame]) -> &'a mut Vec<Instruction> {
    match stack.last_mut() {
        Some(frame) if frame.in_else => &mut frame.otherwise,
        Some(frame) => &mut frame.then,
        None => root,
    }
}

/// Parse translated lines of one method into an instruction tree.
///
/// # Errors
///
/// Returns [`ScriptError::Syntax`] naming `file` and the offending line for
/// lexical errors, unknown functions, and unbalanced `if`/`end`.
pub fn parse_body(file: &Path, lines: &[SourceLine]) -> Result<Vec<Instruction>, ScriptError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for line in lines {
        let err = |message: String| ScriptError::syntax(file, line.number, message);
        let statement = Parser::new(&line.text)
            .and_then(|mut p| p.statement(line.number))
            .map_err(err)?;

        match statement {
            Statement::Blank => {}
            Statement::Simple(instruction) => open_block(&mut root, &mut stack).push(instruction),
            Statement::If(cond) => stack.push(Frame::new(cond, line.number, false)),
            Statement::Elsif(cond) => {
                let Some(frame) = stack.last_mut().filter(|f| !f.in_else) else {
                    return Err(err("elsif without a matching if".to_string()));
                };
                frame.in_else = true;
                stack.push(Frame::new(cond, line.number, true));
            }
            Statement::Else => {
                let Some(frame) = stack.last_mut().filter(|f| !f.in_else) else {
                    return Err(err("else without a matching if".to_string()));
                };
                frame.in_else = true;
            }
            Statement::End => loop {
                let Some(frame) = stack.pop() else {
                    return Err(err("end without a matching if".to_string()));
                };
                let chained = frame.chained;
                open_block(&mut root, &mut stack).push(frame.into_instruction());
                if !chained {
                    break;
                }
            },
        }
    }

    if let Some(frame) = stack.last() {
        return Err(ScriptError::syntax(
            file,
            frame.line,
            "if without a matching end",
        ));
    }
    Ok(root)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn body(lines: &[&str]) -> Result<Vec<Instruction>, ScriptError> {
        let lines: Vec<SourceLine> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| SourceLine::new(i + 1, *l))
            .collect();
        parse_body(Path::new("test.rb"), &lines)
    }

    fn single(line: &str) -> Instruction {
        let mut parsed = body(&[line]).unwrap();
        assert_eq!(parsed.len(), 1);
        parsed.remove(0)
    }

    fn isa(class: &str) -> Expr {
        Expr::Call(Call {
            callee: Callee::Builtin(Builtin::IsaQuery),
            args: vec![Expr::Str(class.to_string())],
        })
    }

    #[test]
    fn parses_canonical_link() {
        let instruction = single("link(\"/mnt/archive\", \"/usr/archive\")");
        assert_eq!(
            instruction,
            Instruction::Call {
                call: Call {
                    callee: Callee::Builtin(Builtin::Link),
                    args: vec![
                        Expr::Str("/mnt/archive".into()),
                        Expr::Str("/usr/archive".into())
                    ],
                },
                line: 1,
            }
        );
    }

    #[test]
    fn parses_parenless_call_with_map() {
        let Instruction::Call { call, .. } = single("copy src,{'dest'=>dest,'mode'=>0444}") else {
            panic!("expected a call");
        };
        assert_eq!(call.callee, Callee::Builtin(Builtin::Copy));
        assert_eq!(
            call.args,
            vec![
                Expr::Word("src".into()),
                Expr::Map(vec![
                    (Expr::Str("dest".into()), Expr::Word("dest".into())),
                    (Expr::Str("mode".into()), Expr::Int(0o444)),
                ]),
            ]
        );
    }

    #[test]
    fn leading_zero_is_octal() {
        assert_eq!(parse_expression("0644").unwrap(), Expr::Int(420));
        assert_eq!(parse_expression("644").unwrap(), Expr::Int(644));
        assert_eq!(parse_expression("0").unwrap(), Expr::Int(0));
        assert!(parse_expression("09").is_err());
    }

    #[test]
    fn and_or_evaluate_left_to_right() {
        let expr = parse_expression("isa?('a') or isa?('b') and isa?('c')").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinOp::And,
                Expr::binary(BinOp::Or, isa("a"), isa("b")),
                isa("c")
            )
        );
    }

    #[test]
    fn not_binds_to_next_operand() {
        let expr = parse_expression("not isa?('a') and isa?('b')").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinOp::And, Expr::Not(Box::new(isa("a"))), isa("b"))
        );
    }

    #[test]
    fn interpolation_parts() {
        let expr = parse_expression("\"x#{@y}z\"").unwrap();
        assert_eq!(
            expr,
            Expr::Interp(vec![
                StrPart::Lit("x".into()),
                StrPart::Expr(Expr::Ivar("y".into())),
                StrPart::Lit("z".into()),
            ])
        );
    }

    #[test]
    fn site_assignment_and_reference() {
        assert_eq!(
            single("site['timeserver'] = '10.0.0.2'"),
            Instruction::Assign {
                target: Target::Site("timeserver".into()),
                value: Expr::Str("10.0.0.2".into()),
                line: 1,
            }
        );
        assert_eq!(
            parse_expression("site['a'] + '/x'").unwrap(),
            Expr::binary(BinOp::Add, Expr::Site("a".into()), Expr::Str("/x".into()))
        );
    }

    #[test]
    fn trailing_modifier_wraps_in_if() {
        let instruction = single("@ef.write if @ef.changed?");
        let Instruction::If {
            cond,
            then,
            otherwise,
            ..
        } = instruction
        else {
            panic!("expected an if");
        };
        assert!(matches!(
            cond,
            Expr::Call(Call {
                callee: Callee::Method {
                    method: EditorMethod::Changed,
                    ..
                },
                ..
            })
        ));
        assert_eq!(then.len(), 1);
        assert!(otherwise.is_empty());
    }

    #[test]
    fn comments_and_closers() {
        let parsed = body(&["if isa?('a')", "  puts 'x'", "end # ---- a::"]).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(matches!(&parsed[0], Instruction::If { then, .. } if then.len() == 1));
    }

    #[test]
    fn else_and_elsif_chain() {
        let parsed = body(&[
            "if isa?('a')",
            "puts 'a'",
            "elsif isa?('b')",
            "puts 'b'",
            "else",
            "puts 'c'",
            "end",
            "puts 'after'",
        ])
        .unwrap();
        assert_eq!(parsed.len(), 2);
        let Instruction::If { otherwise, .. } = &parsed[0] else {
            panic!("expected an if");
        };
        assert_eq!(otherwise.len(), 1);
        let Instruction::If {
            then,
            otherwise: inner_else,
            ..
        } = &otherwise[0]
        else {
            panic!("expected a nested if");
        };
        assert_eq!(then.len(), 1);
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn unbalanced_end_reports_line() {
        let err = body(&["puts 'x'", "end"]).unwrap_err();
        assert_eq!(err.to_string(), "test.rb line 2: end without a matching if");
    }

    #[test]
    fn missing_end_reports_if_line() {
        let err = body(&["puts 'x'", "if isa?('a')", "puts 'y'"]).unwrap_err();
        assert_eq!(err.to_string(), "test.rb line 2: if without a matching end");
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = body(&["format_disk '/dev/sda'"]).unwrap_err();
        assert!(err.to_string().contains("unknown function 'format_disk'"));
        let err = body(&["frobnicate('/x')"]).unwrap_err();
        assert!(err.to_string().contains("unknown function 'frobnicate'"));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = body(&["@ef.Truncate"]).unwrap_err();
        assert!(err.to_string().contains("unknown method 'Truncate'"));
    }

    #[test]
    fn word_list_and_constants() {
        let Instruction::Call { call, .. } = single("assign %w{ sshd any test }") else {
            panic!("expected a call");
        };
        assert_eq!(
            call.args,
            vec![Expr::List(vec![
                Expr::Str("sshd".into()),
                Expr::Str("any".into()),
                Expr::Str("test".into()),
            ])]
        );
        let expr = parse_expression("File.directory?(@dir)").unwrap();
        assert!(matches!(
            expr,
            Expr::Call(Call {
                callee: Callee::Builtin(Builtin::IsDirectory),
                ..
            })
        ));
    }

    #[test]
    fn local_assignment_from_constructor() {
        let instruction = single("ef = EditFile.new \"/etc/resolv.conf\"");
        assert!(matches!(
            instruction,
            Instruction::Assign {
                target: Target::Local(ref name),
                value: Expr::Call(Call { callee: Callee::Builtin(Builtin::EditFile), .. }),
                ..
            } if name == "ef"
        ));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = body(&["puts \"abc"]).unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }
}
