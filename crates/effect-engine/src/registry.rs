//! 类型注册表
//!
//! 条件、效果、效果参数和链执行器工厂都按 ID 注册。注册发生在启动或扩展加载时，
//! 之后以读为主；重复注册时后写入者生效。

use crate::chain::EffectChains;
use crate::chain::executor::{
    ChainExecutorFactory, CycleExecutorFactory, NormalExecutorFactory, RandomExecutorFactory,
};
use crate::condition::builtin::{
    AttributeAtLeast, HasPermission, PlaceholderEquals, PlaceholderGreaterThan,
    PlaceholderLessThan,
};
use crate::condition::{Condition, DynCondition};
use crate::effect::argument::{ArgumentChance, ArgumentRequire, DynEffectArgument, EffectArgument};
use crate::effect::builtin::{GivePermission, LogMessage, RunChain, SendMessage};
use crate::effect::{DynEffect, Effect};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 按 ID 索引的注册表
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 注册条目，返回被覆盖的旧条目
    pub fn register(&self, id: impl Into<String>, entry: Arc<T>) -> Option<Arc<T>> {
        let id = id.into();
        let previous = self.entries.write().insert(id.clone(), entry);
        if previous.is_some() {
            debug!(kind = self.kind, id = %id, "覆盖已注册的条目");
        }
        previous
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// 所有 ID（按字典序）
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// 运行时的全部注册表
///
/// 构造顺序：先注册类型和提供者，再编译配置，最后运行解析器。
pub struct Registries {
    pub conditions: Registry<dyn DynCondition>,
    pub effects: Registry<dyn DynEffect>,
    pub arguments: Registry<dyn DynEffectArgument>,
    pub executors: Registry<dyn ChainExecutorFactory>,
    pub chains: EffectChains,
}

impl Registries {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            conditions: Registry::new("condition"),
            effects: Registry::new("effect"),
            arguments: Registry::new("effect_argument"),
            executors: Registry::new("chain_executor"),
            chains: EffectChains::new(),
        }
    }

    /// 创建注册了所有内置类型的注册表
    pub fn with_builtins() -> Self {
        let registries = Self::new();

        registries.register_condition(PlaceholderEquals);
        registries.register_condition(PlaceholderGreaterThan);
        registries.register_condition(PlaceholderLessThan);
        registries.register_condition(HasPermission);
        registries.register_condition(AttributeAtLeast);

        registries.register_effect(GivePermission);
        registries.register_effect(SendMessage);
        registries.register_effect(LogMessage);
        registries.register_effect(RunChain);

        registries.register_argument(ArgumentRequire);
        registries.register_argument(ArgumentChance);

        registries.register_executor(NormalExecutorFactory);
        registries.register_executor(RandomExecutorFactory);
        registries.register_executor(CycleExecutorFactory);

        registries
    }

    pub fn register_condition<C: Condition>(&self, condition: C) {
        let id = condition.id().to_string();
        self.conditions.register(id, Arc::new(condition));
    }

    pub fn register_effect<E: Effect>(&self, effect: E) {
        let id = effect.id().to_string();
        self.effects.register(id, Arc::new(effect));
    }

    pub fn register_argument<A: EffectArgument>(&self, argument: A) {
        let name = argument.name().to_string();
        self.arguments.register(name, Arc::new(argument));
    }

    pub fn register_executor<F: ChainExecutorFactory + 'static>(&self, factory: F) {
        let id = factory.id().to_string();
        self.executors.register(id, Arc::new(factory));
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}
