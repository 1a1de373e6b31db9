//! 运行时门面
//!
//! 把注册表、编译器、持有者解析缓存和生效效果解析器组装在一起，
//! 并负责触发器分发。

use crate::chain::Chain;
use crate::compiler::Compiler;
use crate::condition::ConditionBlock;
use crate::config::ConfigSection;
use crate::effect::EffectBlock;
use crate::expression::{ArithmeticEvaluator, ExpressionEvaluator};
use crate::holder::{FnHolderProvider, Holder, HolderProvider, ProvidedHolder};
use crate::holder_cache::HolderResolver;
use crate::registry::Registries;
use crate::resolver::{ActiveEffectResolver, ActiveEffectSet, EffectSet, UpdateReport};
use crate::subject::Subject;
use crate::trigger::{DispatchedTrigger, Trigger, TriggerData};
use metrics::counter;
use reforge_shared::config::EngineConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// 一次分发的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 监听该触发器的生效效果数
    pub matched: usize,
    /// 成功响应的效果数
    pub fired: usize,
}

/// 规则运行时
pub struct Engine {
    registries: Arc<Registries>,
    compiler: Compiler,
    holders: Arc<HolderResolver>,
    resolver: ActiveEffectResolver,
}

impl Engine {
    /// 使用内置类型和默认表达式服务创建运行时
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_parts(
            Arc::new(Registries::with_builtins()),
            Arc::new(ArithmeticEvaluator::new()),
            config.holder_cache_ttl(),
        )
    }

    pub fn with_parts(
        registries: Arc<Registries>,
        expressions: Arc<dyn ExpressionEvaluator>,
        holder_ttl: Duration,
    ) -> Self {
        let holders = Arc::new(HolderResolver::new(holder_ttl));
        Self {
            compiler: Compiler::new(registries.clone(), expressions),
            resolver: ActiveEffectResolver::new(holders.clone()),
            registries,
            holders,
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn holder_resolver(&self) -> &Arc<HolderResolver> {
        &self.holders
    }

    pub fn register_holder_provider(&self, provider: Arc<dyn HolderProvider>) {
        self.holders.register_provider(provider);
    }

    pub fn register_provider_fn<F>(&self, f: F)
    where
        F: Fn(&dyn Subject) -> Vec<ProvidedHolder> + Send + Sync + 'static,
    {
        self.holders
            .register_provider(Arc::new(FnHolderProvider::new(f)));
    }

    /// 注册缓存未命中后的观察者
    pub fn on_holders_provided<F>(&self, observer: F)
    where
        F: Fn(&dyn Subject, &[ProvidedHolder]) + Send + Sync + 'static,
    {
        self.holders.on_holders_provided(observer);
    }

    pub fn section(&self, value: Value) -> ConfigSection {
        self.compiler.section(value)
    }

    pub fn compile_condition(&self, config: &ConfigSection, context: &str) -> Option<ConditionBlock> {
        self.compiler.compile_condition(config, context)
    }

    pub fn compile_effect(&self, config: &ConfigSection, context: &str) -> Option<Arc<EffectBlock>> {
        self.compiler.compile_effect(config, context)
    }

    pub fn compile_holder(&self, config: &ConfigSection, context: &str) -> Option<Arc<Holder>> {
        self.compiler.compile_holder(config, context)
    }

    pub fn compile_chain(
        &self,
        config: &ConfigSection,
        context: &str,
        anonymous: bool,
    ) -> Option<Arc<Chain>> {
        self.compiler.compile_chain(config, context, anonymous)
    }

    pub fn chain(&self, id: &str) -> Option<Arc<Chain>> {
        self.registries.chains.get_by_id(id)
    }

    pub fn holders(&self, subject: &dyn Subject) -> Arc<Vec<ProvidedHolder>> {
        self.holders.holders(subject)
    }

    pub fn force_rescan(&self, subject_id: Uuid) {
        self.holders.force_rescan(subject_id);
    }

    pub fn compute_active(&self, subject: &dyn Subject) -> ActiveEffectSet {
        self.resolver.compute_active(subject)
    }

    pub fn update_effects(&self, subject: &dyn Subject) -> UpdateReport {
        self.resolver.update_effects(subject)
    }

    pub fn active_effects(&self, subject_id: Uuid) -> EffectSet {
        self.resolver.active_effects(subject_id)
    }

    pub fn provided_active_effects(&self, subject_id: Uuid) -> ActiveEffectSet {
        self.resolver.provided_active_effects(subject_id)
    }

    /// 主体离开时清理状态和缓存
    pub fn forget_subject(&self, subject_id: Uuid) {
        self.resolver.forget(subject_id);
        self.holders.remove(subject_id);
    }

    /// 分发一次触发
    ///
    /// 对上一次更新后生效且监听该触发器的每个效果，检查效果参数后调用触发响应。
    #[instrument(skip(self, subject, trigger, data), fields(subject = %subject.id(), trigger = %trigger))]
    pub fn dispatch(
        &self,
        subject: Arc<dyn Subject>,
        trigger: &Trigger,
        data: TriggerData,
    ) -> DispatchReport {
        counter!("trigger_dispatches_total", "trigger" => trigger.id().to_string()).increment(1);

        let active = self.resolver.active_effects(subject.id());
        let dispatched = DispatchedTrigger::new(subject, trigger.clone(), data);

        let mut report = DispatchReport::default();
        for effect in active.iter().filter(|e| e.listens_to(trigger)) {
            report.matched += 1;
            if effect.trigger(&dispatched) {
                report.fired += 1;
            }
        }

        debug!(matched = report.matched, fired = report.fired, "触发分发完成");
        report
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::SimpleSubject;
    use serde_json::json;

    fn engine_with_holder(config: Value) -> Engine {
        let engine = Engine::with_parts(
            Arc::new(Registries::with_builtins()),
            Arc::new(ArithmeticEvaluator::new()),
            Duration::from_secs(60),
        );
        let holder = engine
            .compile_holder(&engine.section(config), "engine test")
            .unwrap();
        engine.register_provider_fn(move |_| vec![ProvidedHolder::new(holder.clone())]);
        engine
    }

    #[test]
    fn test_dispatch_only_reaches_active_listeners() {
        let engine = engine_with_holder(json!({
            "id": "ring",
            "effects": [
                {
                    "id": "send_message",
                    "args": { "message": "hit for %value%" },
                    "triggers": ["melee_attack"]
                },
                {
                    "id": "send_message",
                    "args": { "message": "tick" },
                    "triggers": ["tick"]
                }
            ]
        }));
        let subject = Arc::new(SimpleSubject::new("steve"));

        // 尚未更新，没有生效效果
        let report = engine.dispatch(subject.clone(), &Trigger::new("melee_attack"), TriggerData::new());
        assert_eq!(report, DispatchReport::default());

        engine.update_effects(subject.as_ref());
        let report = engine.dispatch(
            subject.clone(),
            &Trigger::new("melee_attack"),
            TriggerData::new().with_value(3.0),
        );
        assert_eq!(report, DispatchReport { matched: 1, fired: 1 });
        assert_eq!(subject.take_messages(), vec!["hit for 3"]);
    }

    #[test]
    fn test_forget_subject_clears_cache_and_state() {
        let engine = engine_with_holder(json!({
            "id": "ring",
            "effects": [ { "id": "give_permission", "args": { "permission": "fly" } } ]
        }));
        let subject = SimpleSubject::new("steve");

        engine.update_effects(&subject);
        assert!(subject.has_permission("fly"));
        assert_eq!(engine.active_effects(subject.id()).len(), 1);
        assert_eq!(engine.holder_resolver().len(), 1);

        engine.forget_subject(subject.id());
        assert!(engine.active_effects(subject.id()).is_empty());
        assert!(engine.holder_resolver().is_empty());
    }

    #[test]
    fn test_observer_receives_holders() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let engine = engine_with_holder(json!({ "id": "ring", "effects": [] }));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        engine.on_holders_provided(move |_, holders| {
            counter.fetch_add(holders.len(), Ordering::SeqCst);
        });

        let subject = SimpleSubject::new("steve");
        engine.holders(&subject);
        engine.force_rescan(subject.id());
        engine.holders(&subject);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
