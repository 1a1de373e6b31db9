//! 效果与效果块
//!
//! [`Effect`] 定义启用、禁用、重载和触发响应行为；[`EffectBlock`] 把效果绑定到
//! 配置、编译数据、门控条件、效果参数和监听的触发器上。

pub mod argument;
pub mod builtin;

use crate::compiler::CompileContext;
use crate::condition::{CompileData, ConditionBlock, ConditionList};
use crate::config::ConfigSection;
use crate::error::{EngineError, Result};
use crate::holder::ProvidedHolder;
use crate::subject::Subject;
use crate::trigger::{DispatchedTrigger, Trigger};
use argument::ArgumentBlock;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 效果类型
///
/// 生命周期回调默认什么都不做，触发响应默认返回 `false`（未处理）。
pub trait Effect: Send + Sync + 'static {
    type CompileData: Send + Sync + 'static;

    fn id(&self) -> &str;

    fn make_compile_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<Self::CompileData>;

    fn enable(
        &self,
        _subject: &dyn Subject,
        _block: &EffectBlock,
        _compile_data: &Self::CompileData,
    ) -> Result<()> {
        Ok(())
    }

    fn disable(
        &self,
        _subject: &dyn Subject,
        _block: &EffectBlock,
        _compile_data: &Self::CompileData,
    ) -> Result<()> {
        Ok(())
    }

    fn reload(
        &self,
        _subject: &dyn Subject,
        _block: &EffectBlock,
        _compile_data: &Self::CompileData,
    ) -> Result<()> {
        Ok(())
    }

    /// 响应一次触发，返回是否成功
    fn trigger(
        &self,
        _block: &EffectBlock,
        _trigger: &DispatchedTrigger,
        _compile_data: &Self::CompileData,
    ) -> Result<bool> {
        Ok(false)
    }
}

type ErasedData = dyn Any + Send + Sync;

/// 可存入注册表的效果
pub trait DynEffect: Send + Sync {
    fn effect_id(&self) -> &str;

    fn make_effect_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<CompileData>;

    fn enable_dyn(&self, subject: &dyn Subject, block: &EffectBlock, data: &ErasedData)
    -> Result<()>;

    fn disable_dyn(
        &self,
        subject: &dyn Subject,
        block: &EffectBlock,
        data: &ErasedData,
    ) -> Result<()>;

    fn reload_dyn(&self, subject: &dyn Subject, block: &EffectBlock, data: &ErasedData)
    -> Result<()>;

    fn trigger_dyn(
        &self,
        block: &EffectBlock,
        trigger: &DispatchedTrigger,
        data: &ErasedData,
    ) -> Result<bool>;
}

fn downcast<'a, E: Effect>(effect: &E, data: &'a ErasedData) -> Result<&'a E::CompileData> {
    data.downcast_ref::<E::CompileData>()
        .ok_or_else(|| EngineError::CompileDataMismatch(effect.id().to_string()))
}

impl<E: Effect> DynEffect for E {
    fn effect_id(&self) -> &str {
        self.id()
    }

    fn make_effect_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<CompileData> {
        Ok(Box::new(self.make_compile_data(config, context)?))
    }

    fn enable_dyn(
        &self,
        subject: &dyn Subject,
        block: &EffectBlock,
        data: &ErasedData,
    ) -> Result<()> {
        self.enable(subject, block, downcast(self, data)?)
    }

    fn disable_dyn(
        &self,
        subject: &dyn Subject,
        block: &EffectBlock,
        data: &ErasedData,
    ) -> Result<()> {
        self.disable(subject, block, downcast(self, data)?)
    }

    fn reload_dyn(
        &self,
        subject: &dyn Subject,
        block: &EffectBlock,
        data: &ErasedData,
    ) -> Result<()> {
        self.reload(subject, block, downcast(self, data)?)
    }

    fn trigger_dyn(
        &self,
        block: &EffectBlock,
        trigger: &DispatchedTrigger,
        data: &ErasedData,
    ) -> Result<bool> {
        self.trigger(block, trigger, downcast(self, data)?)
    }
}

/// 编译后的效果块
pub struct EffectBlock {
    id: Uuid,
    effect: Arc<dyn DynEffect>,
    config: ConfigSection,
    compile_data: CompileData,
    conditions: Vec<ConditionBlock>,
    arguments: Vec<ArgumentBlock>,
    triggers: Vec<Trigger>,
    context: String,
}

pub(crate) struct EffectBlockParts {
    pub id: Uuid,
    pub effect: Arc<dyn DynEffect>,
    pub config: ConfigSection,
    pub compile_data: CompileData,
    pub conditions: Vec<ConditionBlock>,
    pub arguments: Vec<ArgumentBlock>,
    pub triggers: Vec<Trigger>,
    pub context: String,
}

impl EffectBlock {
    pub(crate) fn from_parts(parts: EffectBlockParts) -> Self {
        Self {
            id: parts.id,
            effect: parts.effect,
            config: parts.config,
            compile_data: parts.compile_data,
            conditions: parts.conditions,
            arguments: parts.arguments,
            triggers: parts.triggers,
            context: parts.context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn effect_id(&self) -> &str {
        self.effect.effect_id()
    }

    /// 效果参数配置（`args`）
    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn conditions(&self) -> &[ConditionBlock] {
        &self.conditions
    }

    pub fn arguments(&self) -> &[ArgumentBlock] {
        &self.arguments
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn listens_to(&self, trigger: &Trigger) -> bool {
        self.triggers.contains(trigger)
    }

    /// 效果自身的条件对 `subject` 在 `holder` 下都满足
    pub fn conditions_met(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> bool {
        self.conditions.are_met(subject, holder)
    }

    pub fn enable(&self, subject: &dyn Subject) -> Result<()> {
        debug!(effect = self.effect_id(), block = %self.id, subject = %subject.id(), "启用效果");
        self.effect.enable_dyn(subject, self, &*self.compile_data)
    }

    pub fn disable(&self, subject: &dyn Subject) -> Result<()> {
        debug!(effect = self.effect_id(), block = %self.id, subject = %subject.id(), "禁用效果");
        self.effect.disable_dyn(subject, self, &*self.compile_data)
    }

    pub fn reload(&self, subject: &dyn Subject) -> Result<()> {
        self.effect.reload_dyn(subject, self, &*self.compile_data)
    }

    /// 所有已配置的效果参数对本次触发都满足
    pub fn arguments_met(&self, trigger: &DispatchedTrigger) -> bool {
        self.arguments.iter().all(|argument| argument.is_met(self, trigger))
    }

    /// 响应一次触发
    ///
    /// 先检查效果参数，全部满足后才调用效果；出错时记录日志并返回 `false`。
    pub fn trigger(&self, trigger: &DispatchedTrigger) -> bool {
        if !self.arguments_met(trigger) {
            return false;
        }

        match self.effect.trigger_dyn(self, trigger, &*self.compile_data) {
            Ok(handled) => handled,
            Err(e) => {
                warn!(
                    context = %self.context,
                    effect = self.effect_id(),
                    trigger = %trigger.trigger(),
                    error = %e,
                    "效果触发失败"
                );
                false
            }
        }
    }
}

impl fmt::Debug for EffectBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBlock")
            .field("id", &self.id)
            .field("effect", &self.effect_id())
            .field("triggers", &self.triggers)
            .field("context", &self.context)
            .finish()
    }
}

impl PartialEq for EffectBlock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EffectBlock {}

impl Hash for EffectBlock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for EffectBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EffectBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
