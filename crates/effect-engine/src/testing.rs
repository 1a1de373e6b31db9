//! 单元测试公用夹具

use crate::compiler::{CompileContext, Compiler};
use crate::condition::Condition;
use crate::config::{ConfigSection, EvaluationContext};
use crate::effect::{Effect, EffectBlock};
use crate::error::{EngineError, Result};
use crate::expression::ArithmeticEvaluator;
use crate::holder::ProvidedHolder;
use crate::registry::Registries;
use crate::subject::Subject;
use crate::trigger::DispatchedTrigger;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

/// 注册了内置类型和测试类型的编译环境
pub(crate) struct TestKit {
    registries: Arc<Registries>,
    compiler: Compiler,
    log: Log,
}

impl TestKit {
    pub fn new() -> Self {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let registries = Arc::new(Registries::with_builtins());
        registries.register_condition(ScriptedCondition);
        registries.register_effect(RecordEffect { log: log.clone() });

        let compiler = Compiler::new(registries.clone(), Arc::new(ArithmeticEvaluator::new()));
        Self {
            registries,
            compiler,
            log,
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn section(&self, value: Value) -> ConfigSection {
        self.compiler.section(value)
    }

    /// `record` 效果记录的调用
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

/// `scripted`：带持有者时返回 `with`，不带时返回 `without`；`error` 为真时求值出错
struct ScriptedCondition;

impl Condition for ScriptedCondition {
    type CompileData = ();

    fn id(&self) -> &str {
        "scripted"
    }

    fn make_compile_data(&self, _: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        Ok(())
    }

    fn is_met(
        &self,
        _subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        holder: Option<&ProvidedHolder>,
        _: &(),
    ) -> Result<bool> {
        if ctx.get_bool("error") {
            return Err(EngineError::InvalidConfig("scripted failure".to_string()));
        }
        Ok(match holder {
            Some(_) => ctx.get_bool("with"),
            None => ctx.get_bool("without"),
        })
    }
}

struct RecordData {
    name: String,
    fail: bool,
    error_on: Option<String>,
}

/// `record`：把每次回调以 `phase:name` 记入日志
///
/// `fail` 使触发响应返回 `false`，`error_on` 使指定阶段返回错误（不记日志）。
struct RecordEffect {
    log: Log,
}

impl RecordEffect {
    fn record(&self, phase: &str, data: &RecordData) -> Result<()> {
        if data.error_on.as_deref() == Some(phase) {
            return Err(EngineError::EffectFailed(format!("{} {}", phase, data.name)));
        }
        self.log.lock().push(format!("{}:{}", phase, data.name));
        Ok(())
    }
}

impl Effect for RecordEffect {
    type CompileData = RecordData;

    fn id(&self) -> &str {
        "record"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<RecordData> {
        Ok(RecordData {
            name: config.require_string("name")?,
            fail: config.get_bool("fail"),
            error_on: config.get_string("error_on"),
        })
    }

    fn enable(&self, _: &dyn Subject, _: &EffectBlock, data: &RecordData) -> Result<()> {
        self.record("enable", data)
    }

    fn disable(&self, _: &dyn Subject, _: &EffectBlock, data: &RecordData) -> Result<()> {
        self.record("disable", data)
    }

    fn reload(&self, _: &dyn Subject, _: &EffectBlock, data: &RecordData) -> Result<()> {
        self.record("reload", data)
    }

    fn trigger(&self, _: &EffectBlock, _: &DispatchedTrigger, data: &RecordData) -> Result<bool> {
        self.record("trigger", data)?;
        Ok(!data.fail)
    }
}
