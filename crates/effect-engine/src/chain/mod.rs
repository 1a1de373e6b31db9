//! 效果链
//!
//! 链是有序、可复用的组件序列，由执行器决定如何调用组件并汇总结果。
//! 具名链登记在 [`EffectChains`] 中，ID 与链一一对应。

pub mod executor;

use crate::effect::EffectBlock;
use crate::trigger::DispatchedTrigger;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// 匿名链的 ID
pub const ANONYMOUS_CHAIN_ID: &str = "anonymous";

/// 链组件
#[derive(Debug, Clone)]
pub enum ChainComponent {
    /// 包装一个效果块
    Effect(Arc<EffectBlock>),
}

impl ChainComponent {
    /// 调用组件的触发响应
    pub fn trigger(&self, trigger: &DispatchedTrigger) -> bool {
        match self {
            ChainComponent::Effect(effect) => effect.trigger(trigger),
        }
    }
}

/// 编译后的效果链，编译后不可变
#[derive(Debug)]
pub struct Chain {
    id: String,
    components: Vec<ChainComponent>,
}

impl Chain {
    pub(crate) fn new(id: impl Into<String>, components: Vec<ChainComponent>) -> Self {
        Self {
            id: id.into(),
            components,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn components(&self) -> &[ChainComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_CHAIN_ID
    }
}

/// 具名链注册表
pub struct EffectChains {
    by_id: RwLock<BTreeMap<String, Arc<Chain>>>,
}

impl EffectChains {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(BTreeMap::new()),
        }
    }

    /// 登记链，同 ID 的旧链被替换
    pub fn register(&self, chain: Arc<Chain>) {
        let previous = self.by_id.write().insert(chain.id().to_string(), chain);
        if let Some(previous) = previous {
            debug!(chain = previous.id(), "覆盖已注册的效果链");
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Chain>> {
        self.by_id.read().get(id).cloned()
    }

    /// 反向查找链的 ID（按实例比较）
    pub fn id_of(&self, chain: &Arc<Chain>) -> Option<String> {
        self.by_id
            .read()
            .iter()
            .find(|(_, registered)| Arc::ptr_eq(registered, chain))
            .map(|(id, _)| id.clone())
    }

    /// 所有已登记链的快照（按 ID 排序）
    pub fn values(&self) -> Vec<Arc<Chain>> {
        self.by_id.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }
}

impl Default for EffectChains {
    fn default() -> Self {
        Self::new()
    }
}
