//! Translation of package expressions into pandas expressions
//!
//! Supported grammar:
//! - arithmetic (`+ - * / %`), where `+` also concatenates strings
//! - comparisons and logical operators (`== != < <= > >= && || !`)
//! - column references: `[Col]`, bare identifiers and `#lineage` refs
//! - variable references: `@[Namespace::Name]` and `@Name`
//! - string, numeric and boolean literals, parentheses
//! - `GETDATE()`, `GETUTCDATE()` and a few column functions
//!
//! Anything else is reported as an unsupported token; the caller decides
//! how to degrade. `/` between two integer operands becomes floor division.

use std::fmt;

use crate::models::{ColumnDef, LineageIndex, SemanticType, Variable};

use super::python::py_str;

/// The first token outside the supported grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedToken(pub String);

impl fmt::Display for UnsupportedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported token '{}'", self.0)
    }
}

/// A translated expression and the variables it reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub code: String,
    /// Qualified names of referenced variables, in first-use order
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Str(String),
    Column(String),
    Ident(String),
    Lineage(String),
    Variable(Option<String>, String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Unsupported(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        match c {
            '[' => {
                let end = chars[i + 1..].iter().position(|&ch| ch == ']');
                match end {
                    Some(len) => {
                        tokens.push(Token::Column(chars[i + 1..i + 1 + len].iter().collect()));
                        i += len + 2;
                    }
                    None => {
                        tokens.push(Token::Unsupported(chars[i..].iter().collect()));
                        break;
                    }
                }
            }
            '"' => {
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            value.push(match chars[j + 1] {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            j += 2;
                        }
                        '"' => {
                            closed = true;
                            j += 1;
                            break;
                        }
                        other => {
                            value.push(other);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    tokens.push(Token::Unsupported(chars[i..].iter().collect()));
                    break;
                }
                tokens.push(Token::Str(value));
                i = j;
            }
            '#' => {
                if next == Some('{') {
                    match chars[i + 2..].iter().position(|&ch| ch == '}') {
                        Some(len) => {
                            tokens.push(Token::Lineage(chars[i + 2..i + 2 + len].iter().collect()));
                            i += len + 3;
                        }
                        None => {
                            tokens.push(Token::Unsupported(chars[i..].iter().collect()));
                            break;
                        }
                    }
                } else {
                    let digits: String = chars[i + 1..].iter().take_while(|ch| ch.is_ascii_digit()).collect();
                    if digits.is_empty() {
                        tokens.push(Token::Unsupported("#".to_string()));
                        i += 1;
                    } else {
                        i += digits.len() + 1;
                        tokens.push(Token::Lineage(digits));
                    }
                }
            }
            '@' => {
                if next == Some('[') {
                    match chars[i + 2..].iter().position(|&ch| ch == ']') {
                        Some(len) => {
                            let inner: String = chars[i + 2..i + 2 + len].iter().collect();
                            tokens.push(match inner.split_once("::") {
                                Some((ns, name)) => Token::Variable(Some(ns.trim().to_string()), name.trim().to_string()),
                                None => Token::Variable(None, inner.trim().to_string()),
                            });
                            i += len + 3;
                        }
                        None => {
                            tokens.push(Token::Unsupported(chars[i..].iter().collect()));
                            break;
                        }
                    }
                } else {
                    let name: String = chars[i + 1..]
                        .iter()
                        .take_while(|ch| ch.is_alphanumeric() || **ch == '_')
                        .collect();
                    if name.is_empty() {
                        tokens.push(Token::Unsupported("@".to_string()));
                        i += 1;
                    } else {
                        i += name.len() + 1;
                        tokens.push(Token::Variable(None, name));
                    }
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '!' => {
                tokens.push(Token::Op("!"));
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "%",
                }));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let number: String = chars[i..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_digit() || **ch == '.')
                    .collect();
                i += number.len();
                // numeric type suffixes such as 1L or 2.5E are not supported
                if chars.get(i).is_some_and(|ch| ch.is_alphabetic()) {
                    let suffix: String = chars[i..].iter().take_while(|ch| ch.is_alphanumeric()).collect();
                    i += suffix.len();
                    tokens.push(Token::Unsupported(format!("{}{}", number, suffix)));
                } else {
                    tokens.push(Token::Number(number));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident: String = chars[i..]
                    .iter()
                    .take_while(|ch| ch.is_alphanumeric() || **ch == '_')
                    .collect();
                i += ident.chars().count();
                tokens.push(Token::Ident(ident));
            }
            other => {
                tokens.push(Token::Unsupported(other.to_string()));
                i += 1;
            }
        }
    }
    tokens
}

/// Translates expressions against one component's columns
#[derive(Debug, Clone, Copy)]
pub struct ExpressionTranslator<'a> {
    frame: &'a str,
    lineage: Option<&'a LineageIndex>,
    variables: &'a [Variable],
    columns: &'a [ColumnDef],
}

/// Deepest accepted nesting of parentheses, calls and unary operators
pub const MAX_NESTING: usize = 64;

impl<'a> ExpressionTranslator<'a> {
    /// `frame` is the Python name of the data frame columns are read from
    pub fn new(frame: &'a str) -> Self {
        Self {
            frame,
            lineage: None,
            variables: &[],
            columns: &[],
        }
    }

    pub fn with_lineage(mut self, lineage: &'a LineageIndex) -> Self {
        self.lineage = Some(lineage);
        self
    }

    pub fn with_variables(mut self, variables: &'a [Variable]) -> Self {
        self.variables = variables;
        self
    }

    /// Input columns whose declared types are known
    pub fn with_columns(mut self, columns: &'a [ColumnDef]) -> Self {
        self.columns = columns;
        self
    }

    pub fn translate(&self, expression: &str) -> Result<Translated, UnsupportedToken> {
        let tokens = tokenize(expression);
        if let Some(Token::Unsupported(token)) = tokens.iter().find(|t| matches!(t, Token::Unsupported(_))) {
            return Err(UnsupportedToken(token.clone()));
        }
        if tokens.is_empty() {
            return Err(UnsupportedToken(String::new()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            translator: self,
            variables: Vec::new(),
            depth: 0,
        };
        let expr = parser.or_expr()?;
        if let Some(token) = parser.peek() {
            return Err(UnsupportedToken(describe(token)));
        }
        Ok(Translated {
            code: expr.code,
            variables: parser.variables,
        })
    }

    fn is_integer_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.name == name && c.semantic_type == SemanticType::Int32)
    }

    fn is_integer_variable(&self, qualified: &str) -> bool {
        self.variables
            .iter()
            .any(|v| v.qualified_name() == qualified && v.data_type == SemanticType::Int32)
    }

    fn column(&self, name: &str) -> String {
        format!("{}[{}]", self.frame, py_str(name))
    }

    fn variable(&self, namespace: Option<&str>, name: &str) -> String {
        match namespace {
            Some(ns) => format!("{}::{}", ns, name),
            None => self
                .variables
                .iter()
                .find(|v| v.matches(None, name))
                .map(Variable::qualified_name)
                .unwrap_or_else(|| format!("User::{}", name)),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => n.clone(),
        Token::Str(s) => format!("\"{}\"", s),
        Token::Column(c) => format!("[{}]", c),
        Token::Ident(i) => i.clone(),
        Token::Lineage(l) => format!("#{}", l),
        Token::Variable(Some(ns), name) => format!("@[{}::{}]", ns, name),
        Token::Variable(None, name) => format!("@{}", name),
        Token::Op(op) => op.to_string(),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        Token::Comma => ",".to_string(),
        Token::Unsupported(u) => u.clone(),
    }
}

struct Parser<'t, 'a> {
    tokens: Vec<Token>,
    pos: usize,
    translator: &'t ExpressionTranslator<'a>,
    variables: Vec<String>,
    depth: usize,
}

/// Generated code of a subexpression
struct Expr {
    code: String,
    integer: bool,
}

impl Expr {
    fn new(code: impl Into<String>, integer: bool) -> Self {
        Self {
            code: code.into(),
            integer,
        }
    }

    fn other(code: impl Into<String>) -> Self {
        Self::new(code, false)
    }
}

type Parsed = Result<Expr, UnsupportedToken>;

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), UnsupportedToken> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(UnsupportedToken(describe(&token))),
            None => Err(UnsupportedToken(describe(&expected))),
        }
    }

    /// Parse one nesting level deeper
    fn nested(&mut self, parse: fn(&mut Self) -> Parsed) -> Parsed {
        if self.depth >= MAX_NESTING {
            return Err(UnsupportedToken(format!("nesting deeper than {}", MAX_NESTING)));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn binary(&mut self, ops: &[&'static str], operand: fn(&mut Self) -> Parsed) -> Parsed {
        let mut left = operand(self)?;
        while let Some(op) = self.eat_op(ops) {
            let right = operand(self)?;
            let both_integer = left.integer && right.integer;
            let (python, integer) = match op {
                "&&" => ("&", false),
                "||" => ("|", false),
                "/" if both_integer => ("//", true),
                "+" | "-" | "*" | "%" => (op, both_integer),
                other => (other, false),
            };
            left = Expr::new(format!("({} {} {})", left.code, python, right.code), integer);
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> Parsed {
        self.binary(&["||"], Self::and_expr)
    }

    fn and_expr(&mut self) -> Parsed {
        self.binary(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Parsed {
        self.binary(&["==", "!="], Self::comparison)
    }

    fn comparison(&mut self) -> Parsed {
        self.binary(&["<", "<=", ">", ">="], Self::additive)
    }

    fn additive(&mut self) -> Parsed {
        self.binary(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Parsed {
        self.binary(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Parsed {
        if self.eat_op(&["-"]).is_some() {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::new(format!("(-{})", operand.code), operand.integer));
        }
        if self.eat_op(&["!"]).is_some() {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::other(format!("(~{})", operand.code)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Parsed {
        let Some(token) = self.next() else {
            return Err(UnsupportedToken("<end of expression>".to_string()));
        };
        match token {
            Token::Number(n) => {
                let integer = !n.contains('.');
                Ok(Expr::new(n, integer))
            }
            Token::Str(s) => Ok(Expr::other(py_str(&s))),
            Token::Column(name) => Ok(self.column(&name)),
            Token::Lineage(id) => {
                let entry = self
                    .translator
                    .lineage
                    .and_then(|index| index.resolve(&id))
                    .ok_or_else(|| UnsupportedToken(format!("#{}", id)))?;
                Ok(Expr::new(
                    self.translator.column(&entry.column),
                    entry.semantic_type == SemanticType::Int32,
                ))
            }
            Token::Variable(namespace, name) => {
                let qualified = self.translator.variable(namespace.as_deref(), &name);
                if !self.variables.contains(&qualified) {
                    self.variables.push(qualified.clone());
                }
                let integer = self.translator.is_integer_variable(&qualified);
                Ok(Expr::new(format!("VARIABLES[{}]", py_str(&qualified)), integer))
            }
            Token::LParen => {
                // (DT_WSTR, 50) style casts
                if let Some(Token::Ident(ident)) = self.peek() {
                    if ident.to_ascii_uppercase().starts_with("DT_") {
                        return Err(UnsupportedToken(format!("({}", ident)));
                    }
                }
                let inner = self.nested(Self::or_expr)?;
                self.expect(Token::RParen)?;
                Ok(Expr::new(format!("({})", inner.code), inner.integer))
            }
            Token::Ident(ident) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    return self.call(&ident);
                }
                match ident.to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Expr::other("True")),
                    "FALSE" => Ok(Expr::other("False")),
                    "NULL" => Err(UnsupportedToken(ident)),
                    _ => Ok(self.column(&ident)),
                }
            }
            other => Err(UnsupportedToken(describe(&other))),
        }
    }

    fn column(&self, name: &str) -> Expr {
        Expr::new(self.translator.column(name), self.translator.is_integer_column(name))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, UnsupportedToken> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.nested(Self::or_expr)?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(UnsupportedToken(describe(&token))),
                None => return Err(UnsupportedToken(")".to_string())),
            }
        }
    }

    fn call(&mut self, function: &str) -> Parsed {
        let name = function.to_ascii_uppercase();
        let args = self.arguments()?;
        let single = |method: &str, integer: Option<bool>| -> Parsed {
            match args.as_slice() {
                [arg] => Ok(Expr::new(
                    format!("{}{}", arg.code, method),
                    integer.unwrap_or(arg.integer),
                )),
                _ => Err(UnsupportedToken(format!("{}()", function))),
            }
        };
        match name.as_str() {
            "GETDATE" if args.is_empty() => Ok(Expr::other("pd.Timestamp.now()")),
            "GETUTCDATE" if args.is_empty() => Ok(Expr::other("pd.Timestamp.now(tz=\"UTC\")")),
            "UPPER" => single(".str.upper()", Some(false)),
            "LOWER" => single(".str.lower()", Some(false)),
            "TRIM" => single(".str.strip()", Some(false)),
            "LTRIM" => single(".str.lstrip()", Some(false)),
            "RTRIM" => single(".str.rstrip()", Some(false)),
            "LEN" => single(".str.len()", Some(true)),
            "ISNULL" => single(".isna()", Some(false)),
            "ABS" => single(".abs()", None),
            _ => Err(UnsupportedToken(function.to_string())),
        }
    }
}
