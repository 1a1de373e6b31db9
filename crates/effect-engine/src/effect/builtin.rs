//! 内置效果

use super::{Effect, EffectBlock};
use crate::chain::Chain;
use crate::chain::executor::ChainExecutor;
use crate::compiler::CompileContext;
use crate::config::ConfigSection;
use crate::error::{EngineError, Result};
use crate::subject::Subject;
use crate::trigger::DispatchedTrigger;
use std::sync::Arc;
use tracing::{debug, info};

/// 启用时授予权限，禁用时撤销
pub struct GivePermission;

impl Effect for GivePermission {
    type CompileData = String;

    fn id(&self) -> &str {
        "give_permission"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<String> {
        config.require_string("permission")
    }

    fn enable(&self, subject: &dyn Subject, block: &EffectBlock, permission: &String) -> Result<()> {
        subject.grant_permission(block.id(), permission);
        Ok(())
    }

    fn disable(&self, subject: &dyn Subject, block: &EffectBlock, _: &String) -> Result<()> {
        subject.revoke_permissions(block.id());
        Ok(())
    }
}

/// 触发时向主体发送消息
pub struct SendMessage;

impl Effect for SendMessage {
    type CompileData = ();

    fn id(&self) -> &str {
        "send_message"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        config.require_string("message").map(|_| ())
    }

    fn trigger(&self, block: &EffectBlock, trigger: &DispatchedTrigger, _: &()) -> Result<bool> {
        let message = block
            .config()
            .resolve_string("message", trigger.placeholders())
            .ok_or_else(|| EngineError::MissingKey("message".to_string()))?;
        trigger.subject().send_message(&message);
        Ok(true)
    }
}

/// 触发时写日志
pub struct LogMessage;

impl Effect for LogMessage {
    type CompileData = ();

    fn id(&self) -> &str {
        "log"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        config.require_string("message").map(|_| ())
    }

    fn trigger(&self, block: &EffectBlock, trigger: &DispatchedTrigger, _: &()) -> Result<bool> {
        let message = block
            .config()
            .resolve_string("message", trigger.placeholders())
            .unwrap_or_default();
        info!(
            subject = %trigger.subject().id(),
            trigger = %trigger.trigger(),
            message = %message,
            "效果日志"
        );
        Ok(true)
    }
}

/// `run_chain` 的编译数据
pub struct ChainInvocation {
    chain: Arc<Chain>,
    executor_id: String,
    executor: Box<dyn ChainExecutor>,
}

/// 触发时执行效果链
///
/// `chain` 引用已注册的链，或用 `effects` 内联定义匿名链；`run_type` 选择执行器，默认 `normal`。
pub struct RunChain;

impl Effect for RunChain {
    type CompileData = ChainInvocation;

    fn id(&self) -> &str {
        "run_chain"
    }

    fn make_compile_data(
        &self,
        config: &ConfigSection,
        context: &CompileContext<'_>,
    ) -> Result<ChainInvocation> {
        let registries = context.compiler().registries();

        let executor_id = config
            .get_string("run_type")
            .unwrap_or_else(|| "normal".to_string());
        let factory = registries
            .executors
            .get(&executor_id)
            .ok_or_else(|| EngineError::UnknownExecutor(executor_id.clone()))?;

        let chain = if let Some(id) = config.get_string("chain") {
            registries
                .chains
                .get_by_id(&id)
                .ok_or(EngineError::ChainNotFound(id))?
        } else if config.has("effects") {
            let inline_context = format!("{} (inline chain)", context.context());
            context
                .compiler()
                .compile_chain(config, &inline_context, true)
                .ok_or(EngineError::EmptyChain(inline_context))?
        } else {
            return Err(EngineError::MissingKey("chain".to_string()));
        };

        Ok(ChainInvocation {
            chain,
            executor_id,
            executor: factory.create(),
        })
    }

    fn trigger(
        &self,
        _block: &EffectBlock,
        trigger: &DispatchedTrigger,
        invocation: &ChainInvocation,
    ) -> Result<bool> {
        debug!(
            chain = invocation.chain.id(),
            executor = %invocation.executor_id,
            "执行效果链"
        );
        Ok(invocation.executor.execute(&invocation.chain, trigger))
    }
}

#[cfg(test)]
mod tests {
    use crate::subject::{SimpleSubject, Subject};
    use crate::testing::TestKit;
    use crate::trigger::{DispatchedTrigger, Trigger, TriggerData};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_give_permission_lifecycle() {
        let kit = TestKit::new();
        let subject = SimpleSubject::new("steve");

        let block = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({ "id": "give_permission", "args": { "permission": "fly" } })),
                "test",
            )
            .unwrap();

        block.enable(&subject).unwrap();
        assert!(subject.has_permission("fly"));
        block.disable(&subject).unwrap();
        assert!(!subject.has_permission("fly"));
    }

    #[test]
    fn test_send_message_resolves_placeholders() {
        let kit = TestKit::new();
        let subject = Arc::new(SimpleSubject::new("steve"));

        let block = kit
            .compiler()
            .compile_effect(
                &kit.section(json!({
                    "id": "send_message",
                    "args": { "message": "%subject_name% 造成了 %value% 点伤害" },
                    "triggers": ["melee_attack"]
                })),
                "test",
            )
            .unwrap();

        let dispatched = DispatchedTrigger::new(
            subject.clone(),
            Trigger::new("melee_attack"),
            TriggerData::new().with_value(7.0),
        );
        assert!(block.trigger(&dispatched));
        assert_eq!(subject.take_messages(), vec!["steve 造成了 7 点伤害"]);
    }

    #[test]
    fn test_run_chain_by_id_and_inline() {
        let kit = TestKit::new();
        let compiler = kit.compiler();

        compiler
            .compile_chain(
                &kit.section(json!({
                    "id": "combo",
                    "effects": [
                        { "id": "record", "args": { "name": "first" } },
                        { "id": "record", "args": { "name": "second" } }
                    ]
                })),
                "test",
                false,
            )
            .unwrap();

        let by_id = compiler
            .compile_effect(
                &kit.section(json!({ "id": "run_chain", "args": { "chain": "combo" } })),
                "test",
            )
            .unwrap();
        let inline = compiler
            .compile_effect(
                &kit.section(json!({
                    "id": "run_chain",
                    "args": { "effects": [ { "id": "record", "args": { "name": "inline" } } ] }
                })),
                "test",
            )
            .unwrap();

        let subject: Arc<dyn Subject> = Arc::new(SimpleSubject::new("steve"));
        let dispatched = DispatchedTrigger::new(subject, Trigger::new("tick"), TriggerData::new());

        assert!(by_id.trigger(&dispatched));
        assert!(inline.trigger(&dispatched));
        assert_eq!(kit.log(), vec!["trigger:first", "trigger:second", "trigger:inline"]);

        // 匿名链不进入注册表
        assert_eq!(kit.registries().chains.len(), 1);
    }

    #[test]
    fn test_run_chain_invalid_references() {
        let kit = TestKit::new();
        let compiler = kit.compiler();

        let missing_chain = json!({ "id": "run_chain", "args": { "chain": "nope" } });
        let bad_executor = json!({
            "id": "run_chain",
            "args": { "run_type": "parallel", "effects": [ { "id": "record", "args": { "name": "x" } } ] }
        });
        let empty_inline = json!({ "id": "run_chain", "args": { "effects": [] } });

        assert!(compiler.compile_effect(&kit.section(missing_chain), "test").is_none());
        assert!(compiler.compile_effect(&kit.section(bad_executor), "test").is_none());
        assert!(compiler.compile_effect(&kit.section(empty_inline), "test").is_none());
    }
}
