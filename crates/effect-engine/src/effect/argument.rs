//! 效果参数
//!
//! 效果参数是按名称注册的触发期门控谓词。效果配置的 `args` 中出现同名键时
//! 才会编译对应的参数块，缺省即视为满足。

use super::EffectBlock;
use crate::compiler::CompileContext;
use crate::condition::CompileData;
use crate::config::ConfigSection;
use crate::error::{EngineError, Result};
use crate::trigger::DispatchedTrigger;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// 效果参数类型
pub trait EffectArgument: Send + Sync + 'static {
    type CompileData: Send + Sync + 'static;

    /// 参数名，同时也是 `args` 中的配置键
    fn name(&self) -> &str;

    fn make_compile_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<Self::CompileData>;

    /// 判断效果块是否应响应本次触发，不得有副作用
    fn is_met(
        &self,
        element: &EffectBlock,
        trigger: &DispatchedTrigger,
        compile_data: &Self::CompileData,
    ) -> Result<bool>;
}

/// 可存入注册表的效果参数
pub trait DynEffectArgument: Send + Sync {
    fn argument_name(&self) -> &str;

    fn make_argument_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<CompileData>;

    fn argument_met(
        &self,
        element: &EffectBlock,
        trigger: &DispatchedTrigger,
        data: &(dyn Any + Send + Sync),
    ) -> Result<bool>;
}

impl<A: EffectArgument> DynEffectArgument for A {
    fn argument_name(&self) -> &str {
        self.name()
    }

    fn make_argument_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<CompileData> {
        Ok(Box::new(self.make_compile_data(config, context)?))
    }

    fn argument_met(
        &self,
        element: &EffectBlock,
        trigger: &DispatchedTrigger,
        data: &(dyn Any + Send + Sync),
    ) -> Result<bool> {
        let data = data
            .downcast_ref::<A::CompileData>()
            .ok_or_else(|| EngineError::CompileDataMismatch(self.name().to_string()))?;
        self.is_met(element, trigger, data)
    }
}

/// 编译后的效果参数
pub struct ArgumentBlock {
    argument: Arc<dyn DynEffectArgument>,
    compile_data: CompileData,
}

impl ArgumentBlock {
    pub(crate) fn new(argument: Arc<dyn DynEffectArgument>, compile_data: CompileData) -> Self {
        Self {
            argument,
            compile_data,
        }
    }

    pub fn name(&self) -> &str {
        self.argument.argument_name()
    }

    /// 求值出错按不满足处理
    pub fn is_met(&self, element: &EffectBlock, trigger: &DispatchedTrigger) -> bool {
        match self
            .argument
            .argument_met(element, trigger, &*self.compile_data)
        {
            Ok(met) => met,
            Err(e) => {
                warn!(
                    context = element.context(),
                    argument = self.name(),
                    error = %e,
                    "效果参数求值失败"
                );
                false
            }
        }
    }
}

impl fmt::Debug for ArgumentBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentBlock")
            .field("name", &self.name())
            .finish()
    }
}

/// `require`：表达式结果必须恰好等于 1
pub struct ArgumentRequire;

impl EffectArgument for ArgumentRequire {
    type CompileData = ();

    fn name(&self) -> &str {
        "require"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        config.require_string("require").map(|_| ())
    }

    fn is_met(&self, element: &EffectBlock, trigger: &DispatchedTrigger, _: &()) -> Result<bool> {
        let value = element
            .config()
            .get_double_from_expression("require", trigger.placeholders())?;
        Ok(value == 1.0)
    }
}

/// `chance`：按百分比概率放行
pub struct ArgumentChance;

impl EffectArgument for ArgumentChance {
    type CompileData = ();

    fn name(&self) -> &str {
        "chance"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        config.require_string("chance").map(|_| ())
    }

    fn is_met(&self, element: &EffectBlock, trigger: &DispatchedTrigger, _: &()) -> Result<bool> {
        let chance = element
            .config()
            .get_double_from_expression("chance", trigger.placeholders())?;
        Ok(rand::random::<f64>() * 100.0 < chance)
    }
}

#[cfg(test)]
mod tests {
    use crate::subject::SimpleSubject;
    use crate::testing::TestKit;
    use crate::trigger::{DispatchedTrigger, Trigger, TriggerData};
    use serde_json::json;
    use std::sync::Arc;

    fn dispatch(value: f64) -> DispatchedTrigger {
        DispatchedTrigger::new(
            Arc::new(SimpleSubject::new("steve")),
            Trigger::new("tick"),
            TriggerData::new().with_value(value),
        )
    }

    #[test]
    fn test_require_needs_exactly_one() {
        let kit = TestKit::new();
        let block = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({ "id": "record", "args": { "name": "r", "require": "%value%" } })),
                "test",
            )
            .unwrap();

        assert_eq!(block.arguments().len(), 1);
        assert_eq!(block.arguments()[0].name(), "require");
        assert!(block.arguments_met(&dispatch(1.0)));
        assert!(!block.arguments_met(&dispatch(2.0)));
        assert!(!block.arguments_met(&dispatch(0.0)));
    }

    #[test]
    fn test_absent_argument_is_vacuous() {
        let kit = TestKit::new();
        let block = kit
            .compiler()
            .compile_effect(&kit.section(json!({ "id": "record", "args": { "name": "r" } })), "test")
            .unwrap();

        assert!(block.arguments().is_empty());
        assert!(block.arguments_met(&dispatch(0.0)));
    }

    #[test]
    fn test_chance_bounds() {
        let kit = TestKit::new();
        let always = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({ "id": "record", "args": { "name": "a", "chance": 100 } })),
                "test",
            )
            .unwrap();
        let never = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({ "id": "record", "args": { "name": "n", "chance": 0 } })),
                "test",
            )
            .unwrap();

        for _ in 0..50 {
            assert!(always.arguments_met(&dispatch(0.0)));
            assert!(!never.arguments_met(&dispatch(0.0)));
        }
    }

    #[test]
    fn test_unresolved_require_is_not_met() {
        let kit = TestKit::new();
        let block = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({ "id": "record", "args": { "name": "r", "require": "%missing% == 1" } })),
                "test",
            )
            .unwrap();

        assert!(!block.arguments_met(&dispatch(1.0)));
    }
}
