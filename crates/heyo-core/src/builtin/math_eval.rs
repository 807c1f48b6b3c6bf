// Restricted arithmetic evaluator
//
// Parses and evaluates a single expression against a fixed whitelist of
// mathematical functions and constants. Nothing outside the whitelist is
// reachable: there are no attribute lookups, no assignments and no builtins
// beyond the table below.
//
// Number semantics follow the interpreter the execution service runs:
// integer arithmetic stays integral, `/` always yields a float, `//` and `%`
// floor toward negative infinity, and results render the way `print()` would.

use thiserror::Error;

/// Errors produced while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Invalid expression syntax: {0}")]
    Syntax(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("'{0}' is a function, not a constant")]
    NotAConstant(String),

    #[error("'{0}' is not a function")]
    NotAFunction(String),

    #[error("{0}() {1}")]
    Arity(String, &'static str),

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error")]
    Domain,

    #[error("math range error")]
    Range,

    #[error("integer overflow")]
    Overflow,
}

type EvalResult<T> = std::result::Result<T, EvalError>;

/// A numeric value: integers stay exact until an operation demands a float
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Render a float the way the reference interpreter prints it: shortest
/// round-trip digits, a trailing `.0` for integral values, and scientific
/// notation outside `1e-4 <= |x| < 1e16`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sci = format!("{x:e}");
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let plain = format!("{x}");
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

/// Evaluate an expression string
pub fn evaluate(expression: &str) -> EvalResult<Number> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        None => Ok(value),
        Some(token) => Err(EvalError::Syntax(format!("unexpected {token}"))),
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "name '{name}'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::DoubleSlash => f.write_str("'//'"),
            Token::Percent => f.write_str("'%'"),
            Token::DoubleStar => f.write_str("'**'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> EvalResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let (number, next) = lex_number(&chars, i)?;
                tokens.push(Token::Number(number));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
                i += 1;
            }
            other => {
                return Err(EvalError::Syntax(format!("invalid character '{other}'")));
            }
        }
    }

    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".to_string()));
    }
    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> EvalResult<(Number, usize)> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    if text == "." {
        return Err(EvalError::Syntax("invalid character '.'".to_string()));
    }

    let number = if is_float {
        text.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| EvalError::Syntax(format!("invalid number '{text}'")))?
    } else {
        text.parse::<i64>().map(Number::Int).map_err(|_| EvalError::Overflow)?
    };
    Ok((number, i))
}

// ============================================================================
// Parser / evaluator
// ============================================================================
//
// expr    := term (('+' | '-') term)*
// term    := unary (('*' | '/' | '//' | '%') unary)*
// unary   := ('+' | '-') unary | power
// power   := primary ('**' unary)?
// primary := NUMBER | NAME | NAME '(' args ')' | '(' expr ')'

/// Nesting bound for parentheses, calls and unary chains
const MAX_DEPTH: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> EvalResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(EvalError::Syntax(format!("expected {expected}, found {token}"))),
            None => Err(EvalError::Syntax(format!("expected {expected}"))),
        }
    }

    fn expr(&mut self) -> EvalResult<Number> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value = add(value, self.term()?)?;
            } else if self.eat(&Token::Minus) {
                value = sub(value, self.term()?)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> EvalResult<Number> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value = mul(value, self.unary()?)?;
            } else if self.eat(&Token::Slash) {
                value = true_div(value, self.unary()?)?;
            } else if self.eat(&Token::DoubleSlash) {
                value = floor_div(value, self.unary()?)?;
            } else if self.eat(&Token::Percent) {
                value = modulo(value, self.unary()?)?;
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive path (parentheses, call arguments, exponents, sign
    // chains) passes through here, so this is where nesting is bounded.
    fn unary(&mut self) -> EvalResult<Number> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::Syntax("expression too deeply nested".to_string()));
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> EvalResult<Number> {
        if self.eat(&Token::Minus) {
            return neg(self.unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> EvalResult<Number> {
        let base = self.primary()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.unary()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> EvalResult<Number> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(EvalError::Syntax(format!("unexpected {token}"))),
            None => Err(EvalError::Syntax("unexpected end of expression".to_string())),
        }
    }

    fn arguments(&mut self) -> EvalResult<Vec<Number>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

fn float(x: f64) -> EvalResult<Number> {
    Ok(Number::Float(x))
}

fn add(a: Number, b: Number) -> EvalResult<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            x.checked_add(y).map(Number::Int).ok_or(EvalError::Overflow)
        }
        _ => float(a.as_f64() + b.as_f64()),
    }
}

fn sub(a: Number, b: Number) -> EvalResult<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            x.checked_sub(y).map(Number::Int).ok_or(EvalError::Overflow)
        }
        _ => float(a.as_f64() - b.as_f64()),
    }
}

fn mul(a: Number, b: Number) -> EvalResult<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            x.checked_mul(y).map(Number::Int).ok_or(EvalError::Overflow)
        }
        _ => float(a.as_f64() * b.as_f64()),
    }
}

fn neg(a: Number) -> EvalResult<Number> {
    match a {
        Number::Int(x) => x.checked_neg().map(Number::Int).ok_or(EvalError::Overflow),
        Number::Float(x) => float(-x),
    }
}

fn true_div(a: Number, b: Number) -> EvalResult<Number> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    float(a.as_f64() / b.as_f64())
}

fn floor_div(a: Number, b: Number) -> EvalResult<Number> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let q = x.checked_div(y).ok_or(EvalError::Overflow)?;
            if (x % y != 0) && ((x < 0) != (y < 0)) {
                Ok(Number::Int(q - 1))
            } else {
                Ok(Number::Int(q))
            }
        }
        _ => float((a.as_f64() / b.as_f64()).floor()),
    }
}

fn modulo(a: Number, b: Number) -> EvalResult<Number> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let r = x.checked_rem(y).ok_or(EvalError::Overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                Ok(Number::Int(r + y))
            } else {
                Ok(Number::Int(r))
            }
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                float(r + y)
            } else {
                float(r)
            }
        }
    }
}

fn pow(base: Number, exponent: Number) -> EvalResult<Number> {
    match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| EvalError::Overflow)?;
            b.checked_pow(e).map(Number::Int).ok_or(EvalError::Overflow)
        }
        _ => {
            let (b, e) = (base.as_f64(), exponent.as_f64());
            if b == 0.0 && e < 0.0 {
                return Err(EvalError::Type(
                    "0.0 cannot be raised to a negative power".to_string(),
                ));
            }
            if b < 0.0 && e.fract() != 0.0 {
                // Would be a complex number
                return Err(EvalError::Domain);
            }
            checked_float(b.powf(e))
        }
    }
}

fn checked_float(x: f64) -> EvalResult<Number> {
    if x.is_infinite() {
        Err(EvalError::Range)
    } else if x.is_nan() {
        Err(EvalError::Domain)
    } else {
        Ok(Number::Float(x))
    }
}

// ============================================================================
// Whitelist
// ============================================================================

const CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("inf", f64::INFINITY),
];

const FUNCTIONS: &[&str] = &[
    "abs", "round", "min", "max", "sum", "pow", "sin", "cos", "tan", "asin", "acos", "atan",
    "atan2", "sinh", "cosh", "tanh", "asinh", "acosh", "atanh", "exp", "log", "log10", "log2",
    "sqrt", "ceil", "floor", "factorial", "gcd", "degrees", "radians",
];

/// Names the evaluator accepts, constants first
pub fn allowed_names() -> impl Iterator<Item = &'static str> {
    CONSTANTS
        .iter()
        .map(|(name, _)| *name)
        .chain(FUNCTIONS.iter().copied())
}

fn constant(name: &str) -> EvalResult<Number> {
    let lowered = name.to_ascii_lowercase();
    if let Some((_, value)) = CONSTANTS.iter().find(|(n, _)| *n == lowered) {
        return Ok(Number::Float(*value));
    }
    if FUNCTIONS.contains(&lowered.as_str()) {
        return Err(EvalError::NotAConstant(name.to_string()));
    }
    Err(EvalError::UnknownVariable(name.to_string()))
}

fn exactly<const N: usize>(name: &str, args: &[Number]) -> EvalResult<[Number; N]> {
    <[Number; N]>::try_from(args).map_err(|_| {
        EvalError::Arity(
            name.to_string(),
            match N {
                1 => "takes exactly one argument",
                _ => "takes exactly two arguments",
            },
        )
    })
}

fn unary_float(name: &str, args: &[Number], f: impl Fn(f64) -> f64) -> EvalResult<Number> {
    let [x] = exactly::<1>(name, args)?;
    let x = x.as_f64();
    let result = f(x);
    if result.is_nan() && !x.is_nan() {
        return Err(EvalError::Domain);
    }
    if result.is_infinite() && x.is_finite() {
        return Err(EvalError::Range);
    }
    Ok(Number::Float(result))
}

fn require_int(name: &str, value: Number) -> EvalResult<i64> {
    match value {
        Number::Int(i) => Ok(i),
        Number::Float(_) => Err(EvalError::Type(format!(
            "{name}() only accepts integral values"
        ))),
    }
}

fn to_int(x: f64) -> EvalResult<Number> {
    if !x.is_finite() {
        return Err(EvalError::Type(format!(
            "cannot convert float {} to integer",
            format_float(x)
        )));
    }
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(EvalError::Overflow);
    }
    Ok(Number::Int(x as i64))
}

fn call(name: &str, args: &[Number]) -> EvalResult<Number> {
    let lowered = name.to_ascii_lowercase();
    if !FUNCTIONS.contains(&lowered.as_str()) {
        if CONSTANTS.iter().any(|(n, _)| *n == lowered) {
            return Err(EvalError::NotAFunction(lowered));
        }
        return Err(EvalError::UnknownFunction(name.to_string()));
    }

    match lowered.as_str() {
        "abs" => {
            let [x] = exactly::<1>(&lowered, args)?;
            match x {
                Number::Int(i) => i.checked_abs().map(Number::Int).ok_or(EvalError::Overflow),
                Number::Float(f) => float(f.abs()),
            }
        }
        "round" => match args {
            [Number::Int(i)] => Ok(Number::Int(*i)),
            [Number::Float(f)] => to_int(f.round_ties_even()),
            [x, digits] => {
                let digits = require_int(&lowered, *digits)?;
                match x {
                    Number::Int(i) if digits >= 0 => Ok(Number::Int(*i)),
                    _ => {
                        let digits = i32::try_from(digits).map_err(|_| EvalError::Overflow)?;
                        let scale = 10f64.powi(digits);
                        let rounded = (x.as_f64() * scale).round_ties_even() / scale;
                        match x {
                            Number::Int(_) => to_int(rounded),
                            Number::Float(_) => float(rounded),
                        }
                    }
                }
            }
            _ => Err(EvalError::Arity(lowered.clone(), "takes one or two arguments")),
        },
        "min" | "max" => {
            let Some((first, rest)) = args.split_first() else {
                return Err(EvalError::Arity(
                    lowered.clone(),
                    "expected at least 1 argument, got 0",
                ));
            };
            let pick_max = lowered == "max";
            Ok(rest.iter().fold(*first, |best, candidate| {
                let better = if pick_max {
                    candidate.as_f64() > best.as_f64()
                } else {
                    candidate.as_f64() < best.as_f64()
                };
                if better {
                    *candidate
                } else {
                    best
                }
            }))
        }
        "sum" => args.iter().try_fold(Number::Int(0), |acc, x| add(acc, *x)),
        "pow" => {
            let [base, exponent] = exactly::<2>(&lowered, args)?;
            pow(base, exponent)
        }
        "sin" => unary_float(&lowered, args, f64::sin),
        "cos" => unary_float(&lowered, args, f64::cos),
        "tan" => unary_float(&lowered, args, f64::tan),
        "asin" => unary_float(&lowered, args, f64::asin),
        "acos" => unary_float(&lowered, args, f64::acos),
        "atan" => unary_float(&lowered, args, f64::atan),
        "sinh" => unary_float(&lowered, args, f64::sinh),
        "cosh" => unary_float(&lowered, args, f64::cosh),
        "tanh" => unary_float(&lowered, args, f64::tanh),
        "asinh" => unary_float(&lowered, args, f64::asinh),
        "acosh" => unary_float(&lowered, args, f64::acosh),
        "atanh" => {
            let [x] = exactly::<1>(&lowered, args)?;
            if x.as_f64().abs() >= 1.0 {
                return Err(EvalError::Domain);
            }
            float(x.as_f64().atanh())
        }
        "atan2" => {
            let [y, x] = exactly::<2>(&lowered, args)?;
            float(y.as_f64().atan2(x.as_f64()))
        }
        "exp" => unary_float(&lowered, args, f64::exp),
        "sqrt" => unary_float(&lowered, args, f64::sqrt),
        "log10" | "log2" => {
            let [x] = exactly::<1>(&lowered, args)?;
            if x.as_f64() <= 0.0 {
                return Err(EvalError::Domain);
            }
            if lowered == "log10" {
                float(x.as_f64().log10())
            } else {
                float(x.as_f64().log2())
            }
        }
        "log" => {
            let (x, base) = match args {
                [x] => (x.as_f64(), None),
                [x, base] => (x.as_f64(), Some(base.as_f64())),
                _ => return Err(EvalError::Arity(lowered.clone(), "takes one or two arguments")),
            };
            if x <= 0.0 {
                return Err(EvalError::Domain);
            }
            match base {
                None => float(x.ln()),
                Some(b) if b <= 0.0 => Err(EvalError::Domain),
                Some(b) if b == 1.0 => Err(EvalError::DivisionByZero),
                Some(b) => float(x.ln() / b.ln()),
            }
        }
        "ceil" | "floor" => {
            let [x] = exactly::<1>(&lowered, args)?;
            match x {
                Number::Int(i) => Ok(Number::Int(i)),
                Number::Float(f) if lowered == "ceil" => to_int(f.ceil()),
                Number::Float(f) => to_int(f.floor()),
            }
        }
        "factorial" => {
            let [n] = exactly::<1>(&lowered, args)?;
            let n = require_int(&lowered, n)?;
            if n < 0 {
                return Err(EvalError::Type(
                    "factorial() not defined for negative values".to_string(),
                ));
            }
            (2..=n)
                .try_fold(1i64, |acc, k| acc.checked_mul(k))
                .map(Number::Int)
                .ok_or(EvalError::Overflow)
        }
        "gcd" => {
            let mut acc: i64 = 0;
            for value in args {
                let mut a = acc;
                let mut b = require_int(&lowered, *value)?;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a.checked_abs().ok_or(EvalError::Overflow)?;
            }
            Ok(Number::Int(acc))
        }
        "degrees" => unary_float(&lowered, args, f64::to_degrees),
        "radians" => unary_float(&lowered, args, f64::to_radians),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
