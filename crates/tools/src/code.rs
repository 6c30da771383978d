//! Sandboxed code evaluation tool.
//!
//! Evaluates a small expression language in-process, with no filesystem,
//! network, or process access. Supports arithmetic (`+`, `-`, `*`, `/`,
//! `%`), parentheses, `let` bindings, string literals with `+` concat,
//! `print(...)` output capture, and a handful of math builtins. Uses a
//! recursive-descent parser that evaluates as it parses.
//!
//! Evaluation failures and timeouts are data, recorded on the code result
//! and rendered as `Error: ...` text for the model. They never abort the
//! run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use agentic_core::config::CodeConfig;
use agentic_core::error::ToolError;
use agentic_core::tool::{CodeResult, Tool, ToolOutcome};

const MAX_STEPS: u32 = 100_000;

pub struct CodeExecTool {
    config: CodeConfig,
}

impl CodeExecTool {
    pub fn new(config: CodeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "code_exec"
    }

    fn description(&self) -> &str {
        "Evaluate simple code for precise computation. Supports arithmetic (+, -, *, /, %), \
         parentheses, variables via 'let', string literals, print(...), and math functions: \
         sqrt, abs, floor, ceil, round, pow, min, max, len. Statements are separated by \
         newlines or semicolons; the value of the last expression is the result."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code to evaluate, e.g. 'let r = 3; 3.14159 * r * r'"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let code = input["code"].as_str().unwrap_or("").trim().to_string();
        if code.is_empty() {
            return Ok(code_outcome(code, Err("No code provided".into())));
        }

        debug!(timeout_ms = self.config.timeout_ms, "Evaluating code");
        let result = run(&code, self.config.timeout_ms);
        Ok(code_outcome(code, result))
    }
}

fn code_outcome(code: String, result: Result<EvalRun, String>) -> ToolOutcome {
    match result {
        Ok(run) => {
            let output = run.render();
            ToolOutcome {
                text: output.clone(),
                code: Some(CodeResult {
                    code,
                    output,
                    error: None,
                }),
                ..Default::default()
            }
        }
        Err(error) => ToolOutcome {
            text: format!("Error: {error}"),
            code: Some(CodeResult {
                code,
                output: String::new(),
                error: Some(error),
            }),
            ..Default::default()
        },
    }
}

// ── Expression-language evaluator ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
    /// Produced by `print(...)`; never a program result.
    Null,
}

fn format_value(value: &Value) -> String {
    match value {
        // Remove trailing .0 for integers.
        Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Value::Num(n) => format!("{n}"),
        Value::Str(s) => s.clone(),
        Value::Null => "null".to_string(),
    }
}

/// The outcome of a successful evaluation: captured print lines plus the
/// value of the final expression statement, if it produced one.
#[derive(Debug)]
struct EvalRun {
    logs: Vec<String>,
    value: Option<Value>,
}

impl EvalRun {
    /// Print lines joined by newlines, with the final value appended after
    /// an arrow when both exist.
    fn render(&self) -> String {
        match (&self.value, self.logs.is_empty()) {
            (Some(value), true) => format_value(value),
            (Some(value), false) => {
                format!("{}\n→ {}", self.logs.join("\n"), format_value(value))
            }
            (None, false) => self.logs.join("\n"),
            (None, true) => String::new(),
        }
    }
}

/// Evaluate a program within the given wall-clock budget.
fn run(code: &str, timeout_ms: u64) -> Result<EvalRun, String> {
    let tokens = tokenize(code)?;
    let mut eval = Evaluator::new(&tokens, timeout_ms);
    eval.run_program()?;
    Ok(EvalRun {
        logs: eval.logs,
        value: eval.last_value,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    LParen,
    RParen,
    Comma,
    Semi,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\r' => i += 1,
            '\n' | ';' => {
                if tokens.last() != Some(&Token::Semi) {
                    tokens.push(Token::Semi);
                }
                i += 1;
            }
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '=' => { tokens.push(Token::Assign); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '/' => {
                // Line comments run to end of line.
                if chars.get(i + 1) == Some(&'/') {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = chars[i];
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err("Unterminated string literal".into()),
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&c) => s.push(c),
                                None => return Err("Unterminated string literal".into()),
                            }
                            i += 1;
                        }
                        Some(&c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    env: HashMap<String, Value>,
    logs: Vec<String>,
    last_value: Option<Value>,
    deadline: Instant,
    timeout_ms: u64,
    steps: u32,
}

impl<'a> Evaluator<'a> {
    fn new(tokens: &'a [Token], timeout_ms: u64) -> Self {
        let mut env = HashMap::new();
        env.insert("pi".to_string(), Value::Num(std::f64::consts::PI));
        env.insert("e".to_string(), Value::Num(std::f64::consts::E));
        Self {
            tokens,
            pos: 0,
            env,
            logs: Vec::new(),
            last_value: None,
            deadline: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
            steps: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn tick(&mut self) -> Result<(), String> {
        self.steps += 1;
        if self.steps > MAX_STEPS {
            return Err("Program too large".into());
        }
        if Instant::now() >= self.deadline {
            return Err(format!("Execution timed out after {}ms", self.timeout_ms));
        }
        Ok(())
    }

    // program = stmt (';' stmt)*
    fn run_program(&mut self) -> Result<(), String> {
        while self.peek().is_some() {
            if self.peek() == Some(&Token::Semi) {
                self.consume();
                continue;
            }
            self.parse_stmt()?;
            match self.peek() {
                None | Some(Token::Semi) => {}
                Some(tok) => return Err(format!("Unexpected token: {tok:?}")),
            }
        }
        Ok(())
    }

    // stmt = 'let' IDENT '=' expr | IDENT '=' expr | expr
    fn parse_stmt(&mut self) -> Result<(), String> {
        self.tick()?;

        if let Some(Token::Ident(name)) = self.peek() {
            if name == "let" {
                self.consume();
                let Some(Token::Ident(name)) = self.consume().cloned() else {
                    return Err("Expected variable name after 'let'".into());
                };
                if self.consume() != Some(&Token::Assign) {
                    return Err(format!("Expected '=' after 'let {name}'"));
                }
                let value = self.parse_expr()?;
                self.env.insert(name, value);
                self.last_value = None;
                return Ok(());
            }
            // Bare assignment: IDENT '=' expr
            if self.tokens.get(self.pos + 1) == Some(&Token::Assign) {
                let name = name.clone();
                if !self.env.contains_key(&name) {
                    return Err(format!("Unknown variable: {name}"));
                }
                self.pos += 2;
                let value = self.parse_expr()?;
                self.env.insert(name, value);
                self.last_value = None;
                return Ok(());
            }
        }

        let value = self.parse_expr()?;
        self.last_value = match value {
            Value::Null => None,
            v => Some(v),
        };
        Ok(())
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Value, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = add(left, right)?;
                }
                Token::Minus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = Value::Num(numeric(&left, "-")? - numeric(&right, "-")?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<Value, String> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Value::Num(numeric(&left, "*")? * numeric(&right, "*")?);
                }
                Token::Slash => {
                    self.consume();
                    let right = numeric(&self.parse_unary()?, "/")?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left = Value::Num(numeric(&left, "/")? / right);
                }
                Token::Percent => {
                    self.consume();
                    let right = numeric(&self.parse_unary()?, "%")?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left = Value::Num(numeric(&left, "%")? % right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = '-' unary | primary
    fn parse_unary(&mut self) -> Result<Value, String> {
        self.tick()?;
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let val = numeric(&self.parse_unary()?, "-")?;
            return Ok(Value::Num(-val));
        }
        self.parse_primary()
    }

    // primary = NUMBER | STRING | IDENT | IDENT '(' args ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Value, String> {
        match self.consume().cloned() {
            Some(Token::Number(n)) => Ok(Value::Num(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.consume();
                    let args = self.parse_args()?;
                    self.call(&name, args)
                } else {
                    self.env
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| format!("Unknown variable: {name}"))
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of program".into()),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Value>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err("Expected ',' or ')' in argument list".into()),
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, String> {
        match name {
            "print" => {
                let line = args
                    .iter()
                    .map(format_value)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.logs.push(line);
                Ok(Value::Null)
            }
            "sqrt" => Ok(Value::Num(arg_num(name, &args, 0)?.sqrt())),
            "abs" => Ok(Value::Num(arg_num(name, &args, 0)?.abs())),
            "floor" => Ok(Value::Num(arg_num(name, &args, 0)?.floor())),
            "ceil" => Ok(Value::Num(arg_num(name, &args, 0)?.ceil())),
            "round" => Ok(Value::Num(arg_num(name, &args, 0)?.round())),
            "pow" => Ok(Value::Num(
                arg_num(name, &args, 0)?.powf(arg_num(name, &args, 1)?),
            )),
            "min" => fold_nums(name, &args, f64::min),
            "max" => fold_nums(name, &args, f64::max),
            "len" => match args.first() {
                Some(Value::Str(s)) => Ok(Value::Num(s.chars().count() as f64)),
                _ => Err("len expects a string".into()),
            },
            _ => Err(format!("Unknown function: {name}")),
        }
    }
}

fn add(left: Value, right: Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
        // String concat coerces the other side.
        (Value::Str(a), b) => Ok(Value::Str(a + &format_value(&b))),
        (a, Value::Str(b)) => Ok(Value::Str(format_value(&a) + &b)),
        _ => Err("Cannot apply '+' to these operands".into()),
    }
}

fn numeric(value: &Value, op: &str) -> Result<f64, String> {
    match value {
        Value::Num(n) => Ok(*n),
        _ => Err(format!("Operator '{op}' expects numbers")),
    }
}

fn arg_num(func: &str, args: &[Value], index: usize) -> Result<f64, String> {
    match args.get(index) {
        Some(Value::Num(n)) => Ok(*n),
        _ => Err(format!("{func} expects a number argument")),
    }
}

fn fold_nums(func: &str, args: &[Value], op: fn(f64, f64) -> f64) -> Result<Value, String> {
    if args.is_empty() {
        return Err(format!("{func} expects at least one argument"));
    }
    let mut acc = arg_num(func, args, 0)?;
    for i in 1..args.len() {
        acc = op(acc, arg_num(func, args, i)?);
    }
    Ok(Value::Num(acc))
}

// ── Tests ─────────────────────────────────────────────────────────────────
