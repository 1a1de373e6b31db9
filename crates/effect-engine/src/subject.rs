//! 主体适配
//!
//! 主体是能够持有能力的实体（玩家、NPC 等），具体实体模型由宿主提供，
//! 运行时只依赖 [`Subject`] trait。

use crate::expression::Placeholders;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// 主体接口
pub trait Subject: Send + Sync {
    /// 主体唯一标识，用作缓存和状态的键
    fn id(&self) -> Uuid;

    fn name(&self) -> String;

    /// 读取主体属性（等级、生命值等）
    fn attribute(&self, _key: &str) -> Option<Value> {
        None
    }

    fn has_permission(&self, _permission: &str) -> bool {
        false
    }

    /// 以 `source` 的名义授予权限，撤销时按来源整体撤销
    fn grant_permission(&self, _source: Uuid, _permission: &str) {}

    fn revoke_permissions(&self, _source: Uuid) {}

    fn send_message(&self, _message: &str) {}

    /// 主体自身的占位符，与持有者无关
    fn placeholders(&self) -> Placeholders {
        Placeholders::new()
            .with("subject_name", self.name())
            .with("subject_id", self.id())
    }
}

/// 内存中的主体实现
#[derive(Debug)]
pub struct SimpleSubject {
    id: Uuid,
    name: String,
    attributes: RwLock<Map<String, Value>>,
    base_permissions: RwLock<HashSet<String>>,
    granted: RwLock<HashMap<Uuid, HashSet<String>>>,
    messages: Mutex<Vec<String>>,
}

impl SimpleSubject {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: RwLock::new(Map::new()),
            base_permissions: RwLock::new(HashSet::new()),
            granted: RwLock::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    pub fn remove_attribute(&self, key: &str) {
        self.attributes.write().remove(key);
    }

    /// 添加不随效果变化的基础权限
    pub fn add_base_permission(&self, permission: impl Into<String>) {
        self.base_permissions.write().insert(permission.into());
    }

    pub fn remove_base_permission(&self, permission: &str) {
        self.base_permissions.write().remove(permission);
    }

    /// 取出并清空已收到的消息
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl Subject for SimpleSubject {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.base_permissions.read().contains(permission)
            || self
                .granted
                .read()
                .values()
                .any(|perms| perms.contains(permission))
    }

    fn grant_permission(&self, source: Uuid, permission: &str) {
        self.granted
            .write()
            .entry(source)
            .or_default()
            .insert(permission.to_string());
    }

    fn revoke_permissions(&self, source: Uuid) {
        self.granted.write().remove(&source);
    }

    fn send_message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    /// 基础占位符加上所有标量属性
    fn placeholders(&self) -> Placeholders {
        let mut placeholders = Placeholders::new()
            .with("subject_name", &self.name)
            .with("subject_id", self.id);

        for (key, value) in self.attributes.read().iter() {
            match value {
                Value::String(s) => placeholders.insert(key.clone(), s),
                Value::Number(n) => placeholders.insert(key.clone(), n),
                Value::Bool(b) => placeholders.insert(key.clone(), b),
                _ => {}
            }
        }

        placeholders
    }
}
