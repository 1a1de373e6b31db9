//! 条件与条件块
//!
//! [`Condition`] 是无状态的命名谓词，每种类型一个共享实例；
//! [`ConditionBlock`] 是编译后的条件实例，绑定配置、编译数据、反转标记
//! 和未满足时的回退效果。

pub mod builtin;

use crate::compiler::CompileContext;
use crate::config::{ConfigSection, EvaluationContext};
use crate::effect::EffectBlock;
use crate::error::{EngineError, Result};
use crate::holder::ProvidedHolder;
use crate::subject::Subject;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 类型擦除后的编译数据
pub type CompileData = Box<dyn Any + Send + Sync>;

/// 无编译数据
pub type NoCompileData = ();

/// 条件类型
pub trait Condition: Send + Sync + 'static {
    /// 编译期从配置中预先计算的数据
    type CompileData: Send + Sync + 'static;

    fn id(&self) -> &str;

    /// 校验配置并生成编译数据，错误会使整个条件块编译失败
    fn make_compile_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<Self::CompileData>;

    /// 判断条件是否满足
    ///
    /// `holder` 为 `None` 时表示与持有者无关的求值。
    fn is_met(
        &self,
        subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        holder: Option<&ProvidedHolder>,
        compile_data: &Self::CompileData,
    ) -> Result<bool>;
}

/// 可存入注册表的条件
pub trait DynCondition: Send + Sync {
    fn condition_id(&self) -> &str;

    fn compile_data(&self, config: &ConfigSection, context: &CompileContext<'_>)
    -> Result<CompileData>;

    fn is_met_dyn(
        &self,
        subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        holder: Option<&ProvidedHolder>,
        compile_data: &(dyn Any + Send + Sync),
    ) -> Result<bool>;
}

impl<C: Condition> DynCondition for C {
    fn condition_id(&self) -> &str {
        self.id()
    }

    fn compile_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<CompileData> {
        Ok(Box::new(self.make_compile_data(config, context)?))
    }

    fn is_met_dyn(
        &self,
        subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        holder: Option<&ProvidedHolder>,
        compile_data: &(dyn Any + Send + Sync),
    ) -> Result<bool> {
        let data = compile_data
            .downcast_ref::<C::CompileData>()
            .ok_or_else(|| EngineError::CompileDataMismatch(self.id().to_string()))?;
        self.is_met(subject, ctx, holder, data)
    }
}

/// 编译后的条件块，编译后不可变
pub struct ConditionBlock {
    id: Uuid,
    condition: Arc<dyn DynCondition>,
    config: ConfigSection,
    compile_data: CompileData,
    not_met_effects: Vec<Arc<EffectBlock>>,
    not_met_lines: Vec<String>,
    show_not_met: bool,
    is_inverted: bool,
    context: String,
}

/// 条件块的构造参数
pub(crate) struct ConditionBlockParts {
    pub id: Uuid,
    pub condition: Arc<dyn DynCondition>,
    pub config: ConfigSection,
    pub compile_data: CompileData,
    pub not_met_effects: Vec<Arc<EffectBlock>>,
    pub not_met_lines: Vec<String>,
    pub show_not_met: bool,
    pub is_inverted: bool,
    pub context: String,
}

impl ConditionBlock {
    pub(crate) fn from_parts(parts: ConditionBlockParts) -> Self {
        Self {
            id: parts.id,
            condition: parts.condition,
            config: parts.config,
            compile_data: parts.compile_data,
            not_met_effects: parts.not_met_effects,
            not_met_lines: parts.not_met_lines,
            show_not_met: parts.show_not_met,
            is_inverted: parts.is_inverted,
            context: parts.context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn condition_id(&self) -> &str {
        self.condition.condition_id()
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn is_inverted(&self) -> bool {
        self.is_inverted
    }

    pub fn show_not_met(&self) -> bool {
        self.show_not_met
    }

    pub fn not_met_effects(&self) -> &[Arc<EffectBlock>] {
        &self.not_met_effects
    }

    pub fn not_met_lines(&self) -> &[String] {
        &self.not_met_lines
    }

    /// 编译位置描述，用于日志
    pub fn context(&self) -> &str {
        &self.context
    }

    /// 判断条件块对 `subject` 是否满足
    ///
    /// 求值两次：一次注入持有者占位符并传入持有者，一次只带主体占位符且不传持有者。
    /// 结果为 `(met_with && met_without) ^ is_inverted`。求值出错时记录日志并视为不满足，
    /// 与是否反转无关。
    pub fn is_met(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> bool {
        match self.evaluate(subject, holder) {
            Ok(met) => met,
            Err(e) => {
                warn!(
                    context = %self.context,
                    condition = self.condition_id(),
                    subject = %subject.id(),
                    error = %e,
                    "条件求值失败，按不满足处理"
                );
                false
            }
        }
    }

    fn evaluate(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> Result<bool> {
        let base = subject.placeholders();

        let with_holder = EvaluationContext::new(&self.config, base.merged(holder.placeholders()));
        let met_with =
            self.condition
                .is_met_dyn(subject, &with_holder, Some(holder), &*self.compile_data)?;

        let without_holder = EvaluationContext::new(&self.config, base);
        let met_without =
            self.condition
                .is_met_dyn(subject, &without_holder, None, &*self.compile_data)?;

        Ok((met_with && met_without) ^ self.is_inverted)
    }
}

impl fmt::Debug for ConditionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionBlock")
            .field("id", &self.id)
            .field("condition", &self.condition_id())
            .field("inverted", &self.is_inverted)
            .field("context", &self.context)
            .finish()
    }
}

impl PartialEq for ConditionBlock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConditionBlock {}

impl Hash for ConditionBlock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// 条件块列表的批量操作
pub trait ConditionList {
    /// 所有条件都满足（空列表视为满足）
    fn are_met(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> bool;

    /// 未满足且需要展示的提示文本
    fn not_met_lines(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> Vec<String>;

    /// 未满足条件的回退效果
    fn not_met_effects(&self, subject: &dyn Subject, holder: &ProvidedHolder)
    -> Vec<Arc<EffectBlock>>;
}

impl ConditionList for [ConditionBlock] {
    fn are_met(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> bool {
        self.iter().all(|block| block.is_met(subject, holder))
    }

    fn not_met_lines(&self, subject: &dyn Subject, holder: &ProvidedHolder) -> Vec<String> {
        self.iter()
            .filter(|block| block.show_not_met && !block.is_met(subject, holder))
            .flat_map(|block| block.not_met_lines.iter().cloned())
            .collect()
    }

    fn not_met_effects(
        &self,
        subject: &dyn Subject,
        holder: &ProvidedHolder,
    ) -> Vec<Arc<EffectBlock>> {
        self.iter()
            .filter(|block| !block.is_met(subject, holder))
            .flat_map(|block| block.not_met_effects.iter().cloned())
            .collect()
    }
}
