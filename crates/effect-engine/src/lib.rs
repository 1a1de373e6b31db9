//! 嵌入式规则运行时
//!
//! 把声明式配置编译成条件和效果，挂到持有者上，并持续为每个主体计算生效的效果：
//! - 条件双重求值与反转
//! - 生效效果差分与启用/禁用/重载回调
//! - 持有者解析缓存
//! - 效果链与可插拔执行器
//! - 触发器分发与效果参数门控

pub mod chain;
pub mod compiler;
pub mod condition;
pub mod config;
pub mod definitions;
pub mod effect;
pub mod engine;
pub mod error;
pub mod expression;
pub mod holder;
pub mod holder_cache;
pub mod registry;
pub mod resolver;
pub mod subject;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::executor::{ChainExecutor, ChainExecutorFactory};
pub use chain::{Chain, ChainComponent, EffectChains};
pub use compiler::{CompileContext, Compiler};
pub use condition::{Condition, ConditionBlock, ConditionList};
pub use config::{ConfigSection, EvaluationContext};
pub use effect::argument::EffectArgument;
pub use effect::{Effect, EffectBlock};
pub use engine::{DispatchReport, Engine};
pub use error::{EngineError, Result};
pub use expression::{ArithmeticEvaluator, ExpressionEvaluator, Placeholders};
pub use holder::{FnHolderProvider, Holder, HolderProvider, ProvidedHolder};
pub use holder_cache::HolderResolver;
pub use registry::Registries;
pub use resolver::{ActiveEffectResolver, ActiveEffectSet, EffectSet, UpdateReport};
pub use subject::{SimpleSubject, Subject};
pub use trigger::{DispatchedTrigger, Trigger, TriggerData};
