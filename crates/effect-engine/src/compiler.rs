//! 配置编译器
//!
//! 把 JSON 元素配置编译成条件块、效果块、持有者和效果链。
//! 公开入口在配置无效时返回 `None` 并带上编译位置记录警告，从不向调用方抛错。

use crate::chain::{ANONYMOUS_CHAIN_ID, Chain, ChainComponent};
use crate::condition::{ConditionBlock, ConditionBlockParts};
use crate::config::ConfigSection;
use crate::effect::argument::ArgumentBlock;
use crate::effect::{EffectBlock, EffectBlockParts};
use crate::error::{EngineError, Result};
use crate::expression::ExpressionEvaluator;
use crate::holder::Holder;
use crate::registry::Registries;
use crate::trigger::Trigger;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// 块标识的命名空间
const BLOCK_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_4d3b_4e8a_9b57_0c2d_8e41_a3f6);

/// 编译期上下文，传给各类型的 `make_compile_data`
pub struct CompileContext<'a> {
    compiler: &'a Compiler,
    context: &'a str,
}

impl<'a> CompileContext<'a> {
    pub fn new(compiler: &'a Compiler, context: &'a str) -> Self {
        Self { compiler, context }
    }

    /// 用于编译嵌套元素（如内联链）
    pub fn compiler(&self) -> &'a Compiler {
        self.compiler
    }

    /// 编译位置描述
    pub fn context(&self) -> &'a str {
        self.context
    }
}

/// 配置编译器
#[derive(Clone)]
pub struct Compiler {
    registries: Arc<Registries>,
    expressions: Arc<dyn ExpressionEvaluator>,
}

impl Compiler {
    pub fn new(registries: Arc<Registries>, expressions: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            registries,
            expressions,
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn expressions(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.expressions
    }

    /// 用本编译器的表达式服务包装一段 JSON
    pub fn section(&self, value: Value) -> ConfigSection {
        ConfigSection::new(value, self.expressions.clone())
    }

    /// 编译单个条件块
    pub fn compile_condition(&self, config: &ConfigSection, context: &str) -> Option<ConditionBlock> {
        self.compile_condition_at(config, context, "")
    }

    /// 编译条件列表，无效的条件被跳过
    pub fn compile_conditions(&self, configs: &[ConfigSection], context: &str) -> Vec<ConditionBlock> {
        self.compile_conditions_at(configs, context, "")
    }

    /// 编译单个效果块
    pub fn compile_effect(&self, config: &ConfigSection, context: &str) -> Option<Arc<EffectBlock>> {
        self.compile_effect_at(config, context, "")
    }

    /// 编译效果列表，无效的效果被跳过
    pub fn compile_effects(&self, configs: &[ConfigSection], context: &str) -> Vec<Arc<EffectBlock>> {
        self.compile_effects_at(configs, context, "")
    }

    /// 编译持有者
    #[instrument(skip(self, config))]
    pub fn compile_holder(&self, config: &ConfigSection, context: &str) -> Option<Arc<Holder>> {
        let id = match config.require_string("id") {
            Ok(id) => id,
            Err(e) => {
                warn!(context = %context, error = %e, "持有者编译失败");
                return None;
            }
        };

        let scope = format!("{} (holder {})", context, id);
        let path = format!("holder:{}", id);
        let effects = self.compile_effects_at(&config.get_subsections("effects"), &scope, &path);
        let conditions =
            self.compile_conditions_at(&config.get_subsections("conditions"), &scope, &path);

        debug!(
            holder = %id,
            effects = effects.len(),
            conditions = conditions.len(),
            "持有者编译完成"
        );
        Some(Arc::new(Holder::new(id, effects, conditions)))
    }

    /// 编译效果链
    ///
    /// 没有任何组件编译成功时返回 `None`，且不会登记任何内容；
    /// `anonymous` 为真时链 ID 固定为 [`ANONYMOUS_CHAIN_ID`] 且不登记。
    #[instrument(skip(self, config))]
    pub fn compile_chain(
        &self,
        config: &ConfigSection,
        context: &str,
        anonymous: bool,
    ) -> Option<Arc<Chain>> {
        let id = if anonymous {
            ANONYMOUS_CHAIN_ID.to_string()
        } else {
            match config.require_string("id") {
                Ok(id) => id,
                Err(e) => {
                    warn!(context = %context, error = %e, "效果链编译失败");
                    return None;
                }
            }
        };

        let scope = format!("{} (chain {})", context, id);
        let path = format!("chain:{}", id);
        let components: Vec<ChainComponent> = self
            .compile_effects_at(&config.get_subsections("effects"), &scope, &path)
            .into_iter()
            .map(ChainComponent::Effect)
            .collect();

        if components.is_empty() {
            warn!(context = %context, chain = %id, "效果链没有可用组件，已忽略");
            return None;
        }

        let chain = Arc::new(Chain::new(id, components));
        if !anonymous {
            self.registries.chains.register(chain.clone());
        }
        Some(chain)
    }

    fn compile_condition_at(
        &self,
        config: &ConfigSection,
        context: &str,
        path: &str,
    ) -> Option<ConditionBlock> {
        self.try_compile_condition(config, context, path)
            .map_err(|e| warn!(context = %context, error = %e, "条件编译失败"))
            .ok()
    }

    fn compile_conditions_at(
        &self,
        configs: &[ConfigSection],
        context: &str,
        path: &str,
    ) -> Vec<ConditionBlock> {
        configs
            .iter()
            .enumerate()
            .filter_map(|(i, config)| {
                self.compile_condition_at(
                    config,
                    &format!("{} conditions[{}]", context, i),
                    &format!("{}/conditions[{}]", path, i),
                )
            })
            .collect()
    }

    fn compile_effect_at(
        &self,
        config: &ConfigSection,
        context: &str,
        path: &str,
    ) -> Option<Arc<EffectBlock>> {
        self.try_compile_effect(config, context, path)
            .map(Arc::new)
            .map_err(|e| warn!(context = %context, error = %e, "效果编译失败"))
            .ok()
    }

    fn compile_effects_at(
        &self,
        configs: &[ConfigSection],
        context: &str,
        path: &str,
    ) -> Vec<Arc<EffectBlock>> {
        configs
            .iter()
            .enumerate()
            .filter_map(|(i, config)| {
                self.compile_effect_at(
                    config,
                    &format!("{} effects[{}]", context, i),
                    &format!("{}/effects[{}]", path, i),
                )
            })
            .collect()
    }

    fn try_compile_condition(
        &self,
        config: &ConfigSection,
        context: &str,
        path: &str,
    ) -> Result<ConditionBlock> {
        let type_id = config.require_string("id")?;
        let condition = self
            .registries
            .conditions
            .get(&type_id)
            .ok_or_else(|| EngineError::UnknownCondition(type_id.clone()))?;

        let args = config.get_subsection("args");
        let compile_data = condition.compile_data(&args, &CompileContext::new(self, context))?;

        let not_met_effects = self.compile_effects_at(
            &args.get_subsections("not_met_effects"),
            &format!("{} (not met)", context),
            &format!("{}/not_met", path),
        );

        Ok(ConditionBlock::from_parts(ConditionBlockParts {
            id: block_id("condition", path, config),
            condition,
            not_met_effects,
            not_met_lines: args.get_strings("not_met_lines"),
            show_not_met: args.get_bool("show_not_met"),
            is_inverted: config.get_bool("inverse"),
            compile_data,
            config: args,
            context: context.to_string(),
        }))
    }

    fn try_compile_effect(
        &self,
        config: &ConfigSection,
        context: &str,
        path: &str,
    ) -> Result<EffectBlock> {
        let type_id = config.require_string("id")?;
        let effect = self
            .registries
            .effects
            .get(&type_id)
            .ok_or_else(|| EngineError::UnknownEffect(type_id.clone()))?;

        let args = config.get_subsection("args");
        let compile_context = CompileContext::new(self, context);
        let compile_data = effect.make_effect_data(&args, &compile_context)?;
        let arguments = self.compile_arguments(&args, &compile_context)?;

        let conditions =
            self.compile_conditions_at(&config.get_subsections("conditions"), context, path);
        let triggers = config
            .get_strings("triggers")
            .into_iter()
            .map(Trigger::new)
            .collect();

        Ok(EffectBlock::from_parts(EffectBlockParts {
            id: block_id("effect", path, config),
            effect,
            config: args,
            compile_data,
            conditions,
            arguments,
            triggers,
            context: context.to_string(),
        }))
    }

    /// 只编译 `args` 中出现了同名键的效果参数，按名称排序
    fn compile_arguments(
        &self,
        args: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<Vec<ArgumentBlock>> {
        let mut arguments = Vec::new();
        for name in self.registries.arguments.ids() {
            if !args.has(&name) {
                continue;
            }
            let Some(argument) = self.registries.arguments.get(&name) else {
                continue;
            };
            let data = argument.make_argument_data(args, context)?;
            arguments.push(ArgumentBlock::new(argument, data));
        }
        Ok(arguments)
    }
}

/// 由类别、结构路径和规范化配置导出稳定的块标识
///
/// 结构路径只由所属持有者或链的 ID 和列表下标组成，与诊断用的编译位置描述无关，
/// 因此同样的内容在不同文件或位置编译出的块相等。
fn block_id(kind: &str, path: &str, config: &ConfigSection) -> Uuid {
    let name = format!("{}\u{0}{}\u{0}{}", kind, path, config.canonical());
    Uuid::new_v5(&BLOCK_NAMESPACE, name.as_bytes())
}
