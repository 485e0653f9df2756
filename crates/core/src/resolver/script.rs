//! Evaluator for the small script dialect found in unpacked chapter scripts.
//!
//! Supported: `function` declarations without parameters, `var` (with
//! comma lists), assignment and indexed assignment, `+=`, `++`, `for` loops,
//! `return`, string/number/array literals, `+`/`-`, comparisons, `.length`,
//! indexing and zero-argument calls. Anything else is a parse error.

use std::collections::HashMap;

use super::{ResolveError, Stage};

/// Hard cap on loop iterations per evaluation.
const MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Num(f64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Elements of an array as strings; a lone string becomes one element.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            Value::Array(items) => items.into_iter().map(|v| v.to_js_string()).collect(),
            Value::Str(s) => vec![s],
            _ => Vec::new(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn script_error(detail: impl Into<String>) -> ResolveError {
    ResolveError::new(Stage::Script, detail)
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    Punct(&'static str),
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "++", "+=", "-=", "(", ")", "{", "}", "[", "]", ";",
    ",", ".", "=", "+", "-", "<", ">",
];

/// Read a quoted literal starting at `chars[start]`, returning the unescaped
/// text and the index just past the closing quote.
pub(crate) fn read_string_literal(chars: &[char], start: usize) -> Option<(String, usize)> {
    let quote = *chars.get(start)?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Some((out, i + 1));
        }
        if c == '\\' {
            let next = *chars.get(i + 1)?;
            i += 2;
            match next {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '0' => out.push('\0'),
                'x' => {
                    let hex: String = chars.get(i..i + 2)?.iter().collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                    i += 2;
                }
                'u' => {
                    let hex: String = chars.get(i..i + 4)?.iter().collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                    i += 4;
                }
                '\n' => {}
                other => out.push(other),
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    None
}

fn tokenize(source: &str) -> Result<Vec<Token>, ResolveError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    'outer: while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }
        if c == '\'' || c == '"' {
            let (text, end) = read_string_literal(&chars, i)
                .ok_or_else(|| script_error("unterminated string literal"))?;
            tokens.push(Token::Str(text));
            i = end;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = if let Some(hex) = literal.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).map(|v| v as f64).ok()
            } else {
                literal.parse::<f64>().ok()
            };
            tokens.push(Token::Num(
                value.ok_or_else(|| script_error(format!("bad number '{}'", literal)))?,
            ));
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        for p in PUNCTUATION {
            let len = p.len();
            if i + len <= chars.len() && chars[i..i + len].iter().copied().eq(p.chars()) {
                tokens.push(Token::Punct(p));
                i += len;
                continue 'outer;
            }
        }
        return Err(script_error(format!("unexpected character '{}'", c)));
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Index(Box<Expr>, Box<Expr>),
    Length(Box<Expr>),
    Call(String),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Target {
    Name(String),
    Index(String, Expr),
}

#[derive(Debug, Clone)]
enum Stmt {
    Function(String, Vec<Stmt>),
    Var(Vec<(String, Option<Expr>)>),
    Assign(Target, Expr),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Expr(Expr),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(q)) if *q == p)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), ResolveError> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(script_error(format!(
                "expected '{}' at token {}, found {:?}",
                p,
                self.pos,
                self.peek()
            )))
        }
    }

    fn ident(&mut self) -> Result<String, ResolveError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(script_error(format!("expected identifier, found {:?}", other))),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(k)) if k == keyword)
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ResolveError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            if self.eat(";") {
                continue;
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ResolveError> {
        if !self.eat("{") {
            return Ok(vec![self.statement()?]);
        }
        let mut stmts = Vec::new();
        while !self.eat("}") {
            if self.peek().is_none() {
                return Err(script_error("unterminated block"));
            }
            if self.eat(";") {
                continue;
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ResolveError> {
        if self.is_keyword("function") {
            self.pos += 1;
            let name = self.ident()?;
            self.expect("(")?;
            self.expect(")")?;
            let body = self.block()?;
            return Ok(Stmt::Function(name, body));
        }
        if self.is_keyword("for") {
            self.pos += 1;
            self.expect("(")?;
            let init = if self.is_punct(";") {
                None
            } else {
                Some(Box::new(self.simple_statement()?))
            };
            self.expect(";")?;
            let cond = if self.is_punct(";") {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect(";")?;
            let update = if self.is_punct(")") {
                None
            } else {
                Some(Box::new(self.simple_statement()?))
            };
            self.expect(")")?;
            let body = self.block()?;
            return Ok(Stmt::For {
                init,
                cond,
                update,
                body,
            });
        }
        if self.is_keyword("return") {
            self.pos += 1;
            let value = if self.is_punct(";") || self.is_punct("}") || self.peek().is_none() {
                None
            } else {
                Some(self.expression()?)
            };
            self.eat(";");
            return Ok(Stmt::Return(value));
        }
        let stmt = self.simple_statement()?;
        self.eat(";");
        Ok(stmt)
    }

    /// `var` declarations, assignments, updates and bare expressions.
    fn simple_statement(&mut self) -> Result<Stmt, ResolveError> {
        if self.is_keyword("var") || self.is_keyword("let") || self.is_keyword("const") {
            self.pos += 1;
            let mut decls = Vec::new();
            loop {
                let name = self.ident()?;
                let init = if self.eat("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                decls.push((name, init));
                if !self.eat(",") {
                    break;
                }
            }
            return Ok(Stmt::Var(decls));
        }

        let start = self.pos;
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            self.pos += 1;
            let target = if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                Target::Index(name.clone(), index)
            } else {
                Target::Name(name.clone())
            };
            let current = match &target {
                Target::Name(n) => Expr::Ident(n.clone()),
                Target::Index(n, i) => {
                    Expr::Index(Box::new(Expr::Ident(n.clone())), Box::new(i.clone()))
                }
            };
            let compound = |op: BinOp, rhs: Expr| {
                Expr::Binary(Box::new(current.clone()), op, Box::new(rhs))
            };
            if self.eat("=") {
                return Ok(Stmt::Assign(target, self.expression()?));
            }
            if self.eat("+=") {
                let rhs = self.expression()?;
                return Ok(Stmt::Assign(target, compound(BinOp::Add, rhs)));
            }
            if self.eat("-=") {
                let rhs = self.expression()?;
                return Ok(Stmt::Assign(target, compound(BinOp::Sub, rhs)));
            }
            if self.eat("++") {
                let one = Expr::Literal(Value::Num(1.0));
                return Ok(Stmt::Assign(target, compound(BinOp::Add, one)));
            }
        }

        self.pos = start;
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ResolveError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Punct("<")) => BinOp::Lt,
            Some(Token::Punct("<=")) => BinOp::Le,
            Some(Token::Punct(">")) => BinOp::Gt,
            Some(Token::Punct(">=")) => BinOp::Ge,
            Some(Token::Punct("==")) | Some(Token::Punct("===")) => BinOp::Eq,
            Some(Token::Punct("!=")) | Some(Token::Punct("!==")) => BinOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary(Box::new(left), op, Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ResolveError> {
        let mut left = self.postfix()?;
        loop {
            let op = if self.eat("+") {
                BinOp::Add
            } else if self.eat("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.postfix()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn postfix(&mut self) -> Result<Expr, ResolveError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(".") {
                let member = self.ident()?;
                if member != "length" {
                    return Err(script_error(format!("unsupported member '{}'", member)));
                }
                expr = Expr::Length(Box::new(expr));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ResolveError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(Value::Num(n))),
            Some(Token::Punct("-")) => match self.next() {
                Some(Token::Num(n)) => Ok(Expr::Literal(Value::Num(-n))),
                other => Err(script_error(format!("unexpected {:?} after '-'", other))),
            },
            Some(Token::Punct("(")) => {
                let expr = self.expression()?;
                self.expect(")")?;
                Ok(expr)
            }
            Some(Token::Punct("[")) => {
                let mut items = Vec::new();
                while !self.eat("]") {
                    items.push(self.expression()?);
                    if !self.eat(",") {
                        self.expect("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(Token::Ident(name)) => {
                if self.eat("(") {
                    self.expect(")")?;
                    Ok(Expr::Call(name))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(script_error(format!("unexpected token {:?}", other))),
        }
    }
}

// =============================================================================
// Interpreter
// =============================================================================

enum Flow {
    Normal,
    Return(Value),
}

struct Interpreter {
    functions: HashMap<String, Vec<Stmt>>,
    scopes: Vec<HashMap<String, Value>>,
    last_assigned: Option<Value>,
    steps: usize,
}

impl Interpreter {
    fn new() -> Self {
        Self {
            functions: HashMap::new(),
            scopes: vec![HashMap::new()],
            last_assigned: None,
            steps: 0,
        }
    }

    fn lookup(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or(Value::Undefined)
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn slot(&mut self, name: &str) -> &mut Value {
        let depth = self
            .scopes
            .iter()
            .rposition(|scope| scope.contains_key(name))
            .unwrap_or(0);
        self.scopes[depth]
            .entry(name.to_string())
            .or_insert(Value::Undefined)
    }

    fn hoist(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::Function(name, body) = stmt {
                self.functions.insert(name.clone(), body.clone());
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ResolveError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ResolveError> {
        match stmt {
            Stmt::Function(..) => {}
            Stmt::Var(decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    if init.is_some() {
                        self.last_assigned = Some(value.clone());
                    }
                    self.declare(name, value);
                }
            }
            Stmt::Assign(target, expr) => {
                let value = self.eval(expr)?;
                match target {
                    Target::Name(name) => {
                        *self.slot(name) = value.clone();
                        self.last_assigned = Some(value);
                    }
                    Target::Index(name, index) => {
                        let index = self.eval(index)?.to_number();
                        if !(index >= 0.0) || index.fract() != 0.0 {
                            return Err(script_error("non-integer array index"));
                        }
                        let index = index as usize;
                        match self.slot(name) {
                            Value::Array(items) => {
                                if index >= items.len() {
                                    items.resize(index + 1, Value::Undefined);
                                }
                                items[index] = value;
                            }
                            _ => {
                                return Err(script_error(format!(
                                    "indexed assignment to non-array '{}'",
                                    name
                                )))
                            }
                        }
                    }
                }
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.exec(init)?;
                }
                loop {
                    self.steps += 1;
                    if self.steps > MAX_STEPS {
                        return Err(script_error("step limit exceeded"));
                    }
                    if let Some(cond) = cond {
                        if !truthy(&self.eval(cond)?) {
                            break;
                        }
                    }
                    if let Flow::Return(value) = self.exec_block(body)? {
                        return Ok(Flow::Return(value));
                    }
                    if let Some(update) = update {
                        self.exec(update)?;
                    }
                }
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ResolveError> {
        Ok(match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Ident(name) => self.lookup(name),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?.to_number();
                if !(index >= 0.0) {
                    return Ok(Value::Undefined);
                }
                match target {
                    Value::Array(items) => items
                        .get(index as usize)
                        .cloned()
                        .unwrap_or(Value::Undefined),
                    Value::Str(s) => s
                        .chars()
                        .nth(index as usize)
                        .map(|c| Value::Str(c.to_string()))
                        .unwrap_or(Value::Undefined),
                    _ => Value::Undefined,
                }
            }
            Expr::Length(target) => match self.eval(target)? {
                Value::Array(items) => Value::Num(items.len() as f64),
                Value::Str(s) => Value::Num(s.encode_utf16().count() as f64),
                _ => return Err(script_error("length of non-sequence")),
            },
            Expr::Call(name) => {
                let body = self
                    .functions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| script_error(format!("unknown function '{}'", name)))?;
                if self.scopes.len() > 32 {
                    return Err(script_error("call depth exceeded"));
                }
                self.scopes.push(HashMap::new());
                self.hoist(&body);
                let flow = self.exec_block(&body);
                self.scopes.pop();
                match flow? {
                    Flow::Return(value) => value,
                    Flow::Normal => Value::Undefined,
                }
            }
            Expr::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(&left, *op, &right)
            }
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined => false,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Array(_) => true,
    }
}

fn binary(left: &Value, op: BinOp, right: &Value) -> Value {
    let bool_value = |b: bool| Value::Num(if b { 1.0 } else { 0.0 });
    match op {
        BinOp::Add => match (left, right) {
            (Value::Num(a), Value::Num(b)) => Value::Num(a + b),
            _ => Value::Str(format!("{}{}", left.to_js_string(), right.to_js_string())),
        },
        BinOp::Sub => Value::Num(left.to_number() - right.to_number()),
        BinOp::Eq => bool_value(left.to_js_string() == right.to_js_string()),
        BinOp::Ne => bool_value(left.to_js_string() != right.to_js_string()),
        BinOp::Lt => bool_value(left.to_number() < right.to_number()),
        BinOp::Le => bool_value(left.to_number() <= right.to_number()),
        BinOp::Gt => bool_value(left.to_number() > right.to_number()),
        BinOp::Ge => bool_value(left.to_number() >= right.to_number()),
    }
}

/// Evaluate a program and return its result.
///
/// The result is the value of a top-level `return`, or else the value of the
/// last assignment executed at any depth.
pub fn evaluate(source: &str) -> Result<Value, ResolveError> {
    let tokens = tokenize(source)?;
    let program = Parser { tokens, pos: 0 }.program()?;

    let mut interpreter = Interpreter::new();
    interpreter.hoist(&program);
    if let Flow::Return(value) = interpreter.exec_block(&program)? {
        return Ok(value);
    }
    interpreter
        .last_assigned
        .ok_or_else(|| script_error("program produced no value"))
}

/// Evaluate a program expected to produce an array of strings.
pub fn evaluate_strings(source: &str) -> Result<Vec<String>, ResolveError> {
    let values = evaluate(source)?.into_strings();
    if values.is_empty() {
        Err(script_error("program produced an empty list"))
    } else {
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpacked_chapter_script() {
        let source = include_str!("../../tests/fixtures/dm5_chapterfun.unpacked.js");
        let urls = evaluate_strings(source).unwrap();
        assert_eq!(urls.len(), 15);
        assert_eq!(
            urls[0],
            "https://image.dm5.example/1/73/119988/10_9412.jpg?pvalue=119988&key=dm5imagefun&uk=72fa4e46b1d09c3e"
        );
        assert!(urls[14].starts_with("https://image.dm5.example/1/73/119988/24_9957.jpg?"));
    }

    #[test]
    fn test_top_level_return_wins() {
        let value = evaluate("var a='x'; return a+1;").unwrap();
        assert_eq!(value, Value::Str("x1".to_string()));
    }

    #[test]
    fn test_last_assignment_is_result() {
        let value = evaluate("var a=[1,2]; var b; b=a.length+3;").unwrap();
        assert_eq!(value, Value::Num(5.0));
    }

    #[test]
    fn test_string_escapes_and_concat() {
        let value = evaluate(r#"var s='it\'s'+"\x41B"+7;"#).unwrap();
        assert_eq!(value, Value::Str("it'sAB7".to_string()));
    }

    #[test]
    fn test_function_scope_shadows_global() {
        let program = "var i=9; function f(){var i=1; return i} var r=f()+i;";
        assert_eq!(evaluate(program).unwrap(), Value::Num(10.0));
    }

    #[test]
    fn test_for_with_plus_equals() {
        let program = "var s=''; for(var i=0;i<3;i+=1){s=s+i} return s;";
        assert_eq!(evaluate(program).unwrap(), Value::Str("012".to_string()));
    }

    #[test]
    fn test_unsupported_syntax_is_script_error() {
        let err = evaluate("var a = b.split('|');").unwrap_err();
        assert_eq!(err.stage, Stage::Script);
        assert!(evaluate("var a = 1 * 2;").is_err());
    }

    #[test]
    fn test_infinite_loop_is_bounded() {
        let err = evaluate("for(var i=0;1;i++){}").unwrap_err();
        assert!(err.detail.contains("step limit"));
    }

    #[test]
    fn test_unknown_function() {
        assert!(evaluate("var d=nope();").is_err());
    }
}
