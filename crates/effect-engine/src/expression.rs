//! 占位符与表达式服务
//!
//! 运行时只通过 [`ExpressionEvaluator`] 访问占位符替换和数值表达式求值，
//! 宿主可以替换为自己的实现。默认实现 [`ArithmeticEvaluator`] 支持 `%name%`
//! 占位符、四则运算、取模、乘方、比较和逻辑运算。

use crate::error::{EngineError, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// 匹配 %name% 格式的占位符
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z0-9_:.\-]+)%").expect("placeholder pattern is valid")
});

/// 占位符集合（名称 -> 文本值）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    values: BTreeMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加占位符
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// 合并另一组占位符，同名时以 `other` 为准
    pub fn merged(&self, other: &Placeholders) -> Placeholders {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Placeholders { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Placeholders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut placeholders = Placeholders::new();
        for (name, value) in iter {
            placeholders.insert(name, value);
        }
        placeholders
    }
}

/// 占位符替换与表达式求值服务
pub trait ExpressionEvaluator: Send + Sync {
    /// 替换文本中的占位符，未知占位符保持原样
    fn resolve_placeholders(&self, text: &str, placeholders: &Placeholders) -> String;

    /// 替换占位符后求值数值表达式
    fn evaluate(&self, expression: &str, placeholders: &Placeholders) -> Result<f64>;
}

/// 默认的算术表达式求值器
#[derive(Debug, Default, Clone, Copy)]
pub struct ArithmeticEvaluator;

impl ArithmeticEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for ArithmeticEvaluator {
    fn resolve_placeholders(&self, text: &str, placeholders: &Placeholders) -> String {
        PLACEHOLDER_REGEX
            .replace_all(text, |caps: &Captures| match placeholders.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn evaluate(&self, expression: &str, placeholders: &Placeholders) -> Result<f64> {
        let resolved = self.resolve_placeholders(expression, placeholders);

        if let Some(caps) = PLACEHOLDER_REGEX.captures(&resolved) {
            return Err(EngineError::UnresolvedPlaceholder(caps[1].to_string()));
        }

        let tokens = tokenize(&resolved).map_err(|reason| EngineError::Expression {
            expression: expression.to_string(),
            reason,
        })?;

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let value = parser
            .parse_expression()
            .and_then(|value| parser.finish(value))
            .map_err(|reason| EngineError::Expression {
                expression: expression.to_string(),
                reason,
            })?;

        if value.is_finite() {
            Ok(value)
        } else {
            Err(EngineError::Expression {
                expression: expression.to_string(),
                reason: "结果不是有限数值".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Op(&'static str),
    LParen,
    RParen,
}

/// 词法分析
fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    // 运算符按长度降序匹配，保证 "<=" 优先于 "<"
    const OPERATORS: [&str; 15] = [
        "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "^", "!",
    ];

    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    'outer: while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let literal = &input[start..i];
            let number = literal
                .parse::<f64>()
                .map_err(|_| format!("无效数字 '{}'", literal))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                i += 1;
            }
            match &input[start..i] {
                "true" => tokens.push(Token::Number(1.0)),
                "false" => tokens.push(Token::Number(0.0)),
                other => return Err(format!("未知标识符 '{}'", other)),
            }
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
                continue;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
                continue;
            }
            _ => {}
        }

        for op in OPERATORS {
            if input[i..].starts_with(op) {
                tokens.push(Token::Op(op));
                i += op.len();
                continue 'outer;
            }
        }

        return Err(format!("无法识别的字符 '{}'", c));
    }

    Ok(tokens)
}

fn truthy(value: f64) -> bool {
    value != 0.0
}

fn boolean(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// 一元运算与括号的最大嵌套层数
const MAX_NESTING_DEPTH: usize = 128;

/// 递归下降解析器，按优先级从低到高：|| && 比较 加减 乘除模 一元 乘方
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type ParseResult = std::result::Result<f64, String>;

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn eat_op(&mut self, candidates: &[&str]) -> Option<&'static str> {
        let op = self.peek_op()?;
        if candidates.contains(&op) {
            self.pos += 1;
            Some(op)
        } else {
            None
        }
    }

    fn finish(&self, value: f64) -> ParseResult {
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some(token) => Err(format!("多余的记号 {:?}", token)),
        }
    }

    fn parse_expression(&mut self) -> ParseResult {
        if self.tokens.is_empty() {
            return Err("表达式为空".to_string());
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult {
        let mut left = self.parse_and()?;
        while self.eat_op(&["||"]).is_some() {
            let right = self.parse_and()?;
            left = boolean(truthy(left) || truthy(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut left = self.parse_comparison()?;
        while self.eat_op(&["&&"]).is_some() {
            let right = self.parse_comparison()?;
            left = boolean(truthy(left) && truthy(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult {
        let left = self.parse_additive()?;
        let Some(op) = self.eat_op(&["==", "!=", "<=", ">=", "<", ">"]) else {
            return Ok(left);
        };
        let right = self.parse_additive()?;

        let result = match op {
            "==" => (left - right).abs() < f64::EPSILON,
            "!=" => (left - right).abs() >= f64::EPSILON,
            "<=" => left <= right,
            ">=" => left >= right,
            "<" => left < right,
            _ => left > right,
        };
        Ok(boolean(result))
    }

    fn parse_additive(&mut self) -> ParseResult {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.parse_multiplicative()?;
            left = if op == "+" { left + right } else { left - right };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let right = self.parse_unary()?;
            left = match op {
                "*" => left * right,
                _ if right == 0.0 => return Err("除数为零".to_string()),
                "/" => left / right,
                _ => left % right,
            };
        }
        Ok(left)
    }

    /// 括号、一元运算和乘方都经由这里递归，在此限制嵌套深度
    fn parse_unary(&mut self) -> ParseResult {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err("表达式嵌套过深".to_string());
        }
        self.depth += 1;
        let result = self.parse_unary_inner();
        self.depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> ParseResult {
        if self.eat_op(&["-"]).is_some() {
            return Ok(-self.parse_unary()?);
        }
        if self.eat_op(&["!"]).is_some() {
            return Ok(boolean(!truthy(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult {
        let base = self.parse_primary()?;
        if self.eat_op(&["^"]).is_some() {
            // 右结合
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ParseResult {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;

        match token {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err("缺少右括号".to_string()),
                }
            }
            Some(other) => Err(format!("意外的记号 {:?}", other)),
            None => Err("表达式意外结束".to_string()),
        }
    }
}
