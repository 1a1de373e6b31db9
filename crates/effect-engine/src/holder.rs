//! 持有者与持有者提供者
//!
//! [`Holder`] 是一个能力来源（装备、职业、套装等）编译后的效果与条件集合；
//! [`ProvidedHolder`] 在持有者之外附带提供者给出的占位符和任意上下文。

use crate::condition::{ConditionBlock, ConditionList};
use crate::effect::EffectBlock;
use crate::expression::Placeholders;
use crate::resolver::EffectSet;
use crate::subject::Subject;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// 编译后的持有者，编译后不可变
#[derive(Debug)]
pub struct Holder {
    id: String,
    effects: Vec<Arc<EffectBlock>>,
    conditions: Vec<ConditionBlock>,
}

impl Holder {
    pub fn new(
        id: impl Into<String>,
        effects: Vec<Arc<EffectBlock>>,
        conditions: Vec<ConditionBlock>,
    ) -> Self {
        Self {
            id: id.into(),
            effects,
            conditions,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn effects(&self) -> &[Arc<EffectBlock>] {
        &self.effects
    }

    pub fn conditions(&self) -> &[ConditionBlock] {
        &self.conditions
    }

    /// 持有者自身的条件全部满足
    pub fn conditions_met(&self, subject: &dyn Subject, provided: &ProvidedHolder) -> bool {
        self.conditions.are_met(subject, provided)
    }

    /// 计算当前生效的效果
    ///
    /// 持有者条件不满足时整体不生效；否则返回自身条件满足的效果块。
    pub fn active_effects(&self, subject: &dyn Subject, provided: &ProvidedHolder) -> EffectSet {
        if !self.conditions_met(subject, provided) {
            return EffectSet::new();
        }

        self.effects
            .iter()
            .filter(|effect| effect.conditions_met(subject, provided))
            .cloned()
            .collect()
    }

    /// 持有者条件中未满足且需要展示的提示
    pub fn not_met_lines(&self, subject: &dyn Subject, provided: &ProvidedHolder) -> Vec<String> {
        self.conditions.not_met_lines(subject, provided)
    }

    /// 持有者条件中未满足条件的回退效果
    pub fn not_met_effects(
        &self,
        subject: &dyn Subject,
        provided: &ProvidedHolder,
    ) -> Vec<Arc<EffectBlock>> {
        self.conditions.not_met_effects(subject, provided)
    }

    fn effect_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.effects.iter().map(|e| e.id())
    }

    fn condition_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.conditions.iter().map(|c| c.id())
    }
}

/// 编译内容相同的持有者视为相等
impl PartialEq for Holder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.effect_ids().eq(other.effect_ids())
            && self.condition_ids().eq(other.condition_ids())
    }
}

impl Eq for Holder {}

impl Hash for Holder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        for id in self.effect_ids() {
            id.hash(state);
        }
        for id in self.condition_ids() {
            id.hash(state);
        }
    }
}

/// 提供者给出的持有者
///
/// 相等性只取决于内部的 [`Holder`]，重复提供同一持有者不会产生差异。
#[derive(Clone)]
pub struct ProvidedHolder {
    holder: Arc<Holder>,
    provider: Option<Arc<dyn Any + Send + Sync>>,
    placeholders: Placeholders,
}

impl ProvidedHolder {
    pub fn new(holder: Arc<Holder>) -> Self {
        Self {
            holder,
            provider: None,
            placeholders: Placeholders::new(),
        }
    }

    /// 附带提供者上下文（如物品实例）
    pub fn with_provider<T: Any + Send + Sync>(mut self, provider: T) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.placeholders.insert(name, value);
        self
    }

    pub fn with_placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = self.placeholders.merged(&placeholders);
        self
    }

    pub fn holder(&self) -> &Arc<Holder> {
        &self.holder
    }

    pub fn provider<T: Any>(&self) -> Option<&T> {
        self.provider.as_deref()?.downcast_ref::<T>()
    }

    /// 注入条件求值的持有者占位符
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }
}

impl fmt::Debug for ProvidedHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedHolder")
            .field("holder", &self.holder.id())
            .field("placeholders", &self.placeholders)
            .finish()
    }
}

impl PartialEq for ProvidedHolder {
    fn eq(&self, other: &Self) -> bool {
        self.holder == other.holder
    }
}

impl Eq for ProvidedHolder {}

impl Hash for ProvidedHolder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.holder.hash(state);
    }
}

/// 持有者提供者
#[cfg_attr(test, mockall::automock)]
pub trait HolderProvider: Send + Sync {
    fn provide(&self, subject: &dyn Subject) -> Vec<ProvidedHolder>;
}

/// 以闭包实现的提供者
pub struct FnHolderProvider<F> {
    f: F,
}

impl<F> FnHolderProvider<F>
where
    F: Fn(&dyn Subject) -> Vec<ProvidedHolder> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> HolderProvider for FnHolderProvider<F>
where
    F: Fn(&dyn Subject) -> Vec<ProvidedHolder> + Send + Sync,
{
    fn provide(&self, subject: &dyn Subject) -> Vec<ProvidedHolder> {
        (self.f)(subject)
    }
}

/// 已注册的提供者，按注册顺序查询
#[derive(Default)]
pub struct HolderProviders {
    providers: RwLock<Vec<Arc<dyn HolderProvider>>>,
}

impl HolderProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn HolderProvider>) {
        self.providers.write().push(provider);
    }

    /// 查询所有提供者并按注册顺序拼接结果
    pub fn provide(&self, subject: &dyn Subject) -> Vec<ProvidedHolder> {
        let providers = self.providers.read().clone();
        providers
            .iter()
            .flat_map(|provider| provider.provide(subject))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}
