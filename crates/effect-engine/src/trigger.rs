//! 触发器模型
//!
//! [`Trigger`] 是事件类型，[`DispatchedTrigger`] 是一次具体的事件发生，
//! 携带当次的上下文数据快照，只在分发期间存在。

use crate::expression::Placeholders;
use crate::subject::Subject;
use std::fmt;
use std::sync::Arc;

/// 触发器类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger {
    id: String,
}

impl Trigger {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// 触发数据
#[derive(Debug, Clone, Default)]
pub struct TriggerData {
    /// 触发值（伤害量、经验值等）
    pub value: Option<f64>,
    pub text: Option<String>,
    /// 额外占位符
    pub extra: Placeholders,
}

impl TriggerData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.extra.insert(name, value);
        self
    }

    /// 转换为占位符：`%trigger_value%`、`%value%`、`%text%` 以及额外占位符
    pub fn to_placeholders(&self) -> Placeholders {
        let mut placeholders = Placeholders::new();
        if let Some(value) = self.value {
            placeholders.insert("trigger_value", value);
            placeholders.insert("value", value);
        }
        if let Some(text) = &self.text {
            placeholders.insert("text", text);
        }
        placeholders.merged(&self.extra)
    }
}

/// 一次分发中的触发器
pub struct DispatchedTrigger {
    subject: Arc<dyn Subject>,
    trigger: Trigger,
    data: TriggerData,
    placeholders: Placeholders,
}

impl fmt::Debug for DispatchedTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchedTrigger")
            .field("subject", &self.subject.id())
            .field("trigger", &self.trigger)
            .field("data", &self.data)
            .finish()
    }
}

impl DispatchedTrigger {
    pub fn new(subject: Arc<dyn Subject>, trigger: Trigger, data: TriggerData) -> Self {
        let placeholders = subject.placeholders().merged(&data.to_placeholders());
        Self {
            subject,
            trigger,
            data,
            placeholders,
        }
    }

    pub fn subject(&self) -> &dyn Subject {
        self.subject.as_ref()
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn data(&self) -> &TriggerData {
        &self.data
    }

    /// 主体占位符与触发数据占位符的快照
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }
}
