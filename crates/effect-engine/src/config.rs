//! 元素配置访问
//!
//! [`ConfigSection`] 包装一段 JSON 配置，提供类型化读取和表达式求值；
//! [`EvaluationContext`] 在求值时显式携带占位符，不修改共享配置。

use crate::error::{EngineError, Result};
use crate::expression::{ExpressionEvaluator, Placeholders};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// 一段已解析的元素配置
#[derive(Clone)]
pub struct ConfigSection {
    value: Arc<Value>,
    expressions: Arc<dyn ExpressionEvaluator>,
}

impl fmt::Debug for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigSection").field(&self.value).finish()
    }
}

impl ConfigSection {
    pub fn new(value: Value, expressions: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            value: Arc::new(value),
            expressions,
        }
    }

    /// 创建空配置段
    pub fn empty(expressions: Arc<dyn ExpressionEvaluator>) -> Self {
        Self::new(Value::Object(Map::new()), expressions)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn expressions(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.expressions
    }

    /// 规范化 JSON 文本（键有序），用于生成稳定的块标识
    pub fn canonical(&self) -> String {
        self.value.to_string()
    }

    /// 获取字段值（支持点号分隔的路径，如 "args.chance"）
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = self.value.as_ref();

        for part in path.split('.') {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }

    /// 读取字符串；数值和布尔值按文本返回
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require_string(&self, path: &str) -> Result<String> {
        match self.get(path) {
            None | Some(Value::Null) => Err(EngineError::MissingKey(path.to_string())),
            Some(_) => self.get_string(path).ok_or_else(|| EngineError::InvalidType {
                key: path.to_string(),
                expected: "string".to_string(),
            }),
        }
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get_bool_or(path, false)
    }

    pub fn get_bool_or(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => default,
        }
    }

    /// 读取字符串列表；单个字符串视为只有一个元素的列表
    pub fn get_strings(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// 读取子配置段，缺失时返回空配置段
    pub fn get_subsection(&self, path: &str) -> ConfigSection {
        match self.get(path) {
            Some(value @ Value::Object(_)) => self.child(value.clone()),
            _ => ConfigSection::empty(self.expressions.clone()),
        }
    }

    /// 读取子配置段列表，非对象元素被忽略
    pub fn get_subsections(&self, path: &str) -> Vec<ConfigSection> {
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| self.child(item.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 替换占位符后读取字符串
    pub fn resolve_string(&self, path: &str, placeholders: &Placeholders) -> Option<String> {
        self.get_string(path)
            .map(|raw| self.expressions.resolve_placeholders(&raw, placeholders))
    }

    /// 读取数值；字符串按表达式求值
    pub fn get_double_from_expression(&self, path: &str, placeholders: &Placeholders) -> Result<f64> {
        match self.get(path) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| EngineError::InvalidType {
                key: path.to_string(),
                expected: "number".to_string(),
            }),
            Some(Value::String(expr)) => self.expressions.evaluate(expr, placeholders),
            Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
            None | Some(Value::Null) => Err(EngineError::MissingKey(path.to_string())),
            Some(_) => Err(EngineError::InvalidType {
                key: path.to_string(),
                expected: "number or expression".to_string(),
            }),
        }
    }

    fn child(&self, value: Value) -> ConfigSection {
        ConfigSection::new(value, self.expressions.clone())
    }
}

/// 一次求值的上下文：配置段加上本次注入的占位符
///
/// 占位符只属于这一次求值，不会泄漏到其他块的求值中。
#[derive(Debug)]
pub struct EvaluationContext<'a> {
    config: &'a ConfigSection,
    placeholders: Placeholders,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(config: &'a ConfigSection, placeholders: Placeholders) -> Self {
        Self {
            config,
            placeholders,
        }
    }

    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    /// 读取并替换占位符
    pub fn get_string(&self, path: &str) -> Result<String> {
        let raw = self.config.require_string(path)?;
        Ok(self
            .config
            .expressions()
            .resolve_placeholders(&raw, &self.placeholders))
    }

    pub fn get_double(&self, path: &str) -> Result<f64> {
        self.config
            .get_double_from_expression(path, &self.placeholders)
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.config.get_bool(path)
    }
}
