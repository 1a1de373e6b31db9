//! 生效效果解析与差分
//!
//! 每次更新时重新计算主体的生效效果集合，与上一次的结果做差分：
//! 先禁用移除的效果，再启用新增的效果，最后重载当前所有生效的效果。
//! 单个效果的生命周期回调失败不会中断同批次的其他效果。

use crate::effect::EffectBlock;
use crate::holder::ProvidedHolder;
use crate::holder_cache::HolderResolver;
use crate::subject::Subject;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// 效果块集合
pub type EffectSet = BTreeSet<Arc<EffectBlock>>;

/// 生效效果集合 -> 产生它的持有者
///
/// 每个贡献了效果的持有者一项，不存在空集合的键。两个持有者给出完全相同的集合时
/// 后者覆盖前者，但展平后的效果集合不受影响。
#[derive(Debug, Clone, Default)]
pub struct ActiveEffectSet {
    entries: HashMap<EffectSet, ProvidedHolder>,
}

impl ActiveEffectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录持有者贡献的效果，空集合被忽略
    pub fn insert(&mut self, effects: EffectSet, holder: ProvidedHolder) -> bool {
        if effects.is_empty() {
            return false;
        }
        self.entries.insert(effects, holder);
        true
    }

    /// 所有生效效果的并集
    pub fn flatten(&self) -> EffectSet {
        self.entries.keys().flatten().cloned().collect()
    }

    /// 贡献了该效果的某个持有者
    pub fn holder_for(&self, effect: &EffectBlock) -> Option<&ProvidedHolder> {
        self.entries
            .iter()
            .find(|(effects, _)| effects.iter().any(|e| e.as_ref() == effect))
            .map(|(_, holder)| holder)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EffectSet, &ProvidedHolder)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Enable,
    Disable,
    Reload,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Enable => write!(f, "enable"),
            LifecyclePhase::Disable => write!(f, "disable"),
            LifecyclePhase::Reload => write!(f, "reload"),
        }
    }
}

/// 一次生命周期回调失败
#[derive(Debug, Clone)]
pub struct LifecycleFailure {
    pub phase: LifecyclePhase,
    pub block: Uuid,
    pub effect: String,
    pub error: String,
}

/// 一次更新的结果
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub added: Vec<Arc<EffectBlock>>,
    pub removed: Vec<Arc<EffectBlock>>,
    pub reloaded: usize,
    pub failures: Vec<LifecycleFailure>,
}

impl UpdateReport {
    /// 生效集合有变化
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Default)]
struct SubjectState {
    active: ActiveEffectSet,
    flattened: EffectSet,
}

/// 生效效果解析器
///
/// 不同主体的更新可以完全并行；同一主体的更新应由调用方串行化。
pub struct ActiveEffectResolver {
    holders: Arc<HolderResolver>,
    previous: DashMap<Uuid, Arc<Mutex<SubjectState>>>,
}

impl ActiveEffectResolver {
    pub fn new(holders: Arc<HolderResolver>) -> Self {
        Self {
            holders,
            previous: DashMap::new(),
        }
    }

    pub fn holders(&self) -> &Arc<HolderResolver> {
        &self.holders
    }

    /// 计算主体当前的生效效果，不触发任何生命周期回调
    pub fn compute_active(&self, subject: &dyn Subject) -> ActiveEffectSet {
        let mut active = ActiveEffectSet::new();
        for provided in self.holders.holders(subject).iter() {
            let effects = provided.holder().active_effects(subject, provided);
            active.insert(effects, provided.clone());
        }
        active
    }

    /// 重新计算并按差分调用生命周期回调
    #[instrument(skip(self, subject), fields(subject = %subject.id()))]
    pub fn update_effects(&self, subject: &dyn Subject) -> UpdateReport {
        let after = self.compute_active(subject);
        let after_flat = after.flatten();

        let before_flat = {
            let state = self.state(subject.id());
            let mut state = state.lock();
            state.active = after;
            std::mem::replace(&mut state.flattened, after_flat.clone())
        };

        let mut report = UpdateReport {
            removed: before_flat.difference(&after_flat).cloned().collect(),
            added: after_flat.difference(&before_flat).cloned().collect(),
            ..Default::default()
        };

        for effect in &report.removed {
            run_phase(LifecyclePhase::Disable, effect, subject, &mut report.failures);
        }
        for effect in &report.added {
            run_phase(LifecyclePhase::Enable, effect, subject, &mut report.failures);
        }
        for effect in &after_flat {
            run_phase(LifecyclePhase::Reload, effect, subject, &mut report.failures);
        }
        report.reloaded = after_flat.len();

        if report.changed() {
            debug!(
                added = report.added.len(),
                removed = report.removed.len(),
                active = after_flat.len(),
                "生效效果已更新"
            );
        }
        report
    }

    /// 上一次更新后的生效效果
    pub fn active_effects(&self, subject_id: Uuid) -> EffectSet {
        self.previous
            .get(&subject_id)
            .map(|state| state.lock().flattened.clone())
            .unwrap_or_default()
    }

    /// 上一次更新后的生效效果及其来源持有者
    pub fn provided_active_effects(&self, subject_id: Uuid) -> ActiveEffectSet {
        self.previous
            .get(&subject_id)
            .map(|state| state.lock().active.clone())
            .unwrap_or_default()
    }

    /// 丢弃主体的状态，不调用任何生命周期回调
    pub fn forget(&self, subject_id: Uuid) {
        self.previous.remove(&subject_id);
    }

    fn state(&self, subject_id: Uuid) -> Arc<Mutex<SubjectState>> {
        self.previous.entry(subject_id).or_default().clone()
    }
}

fn run_phase(
    phase: LifecyclePhase,
    effect: &EffectBlock,
    subject: &dyn Subject,
    failures: &mut Vec<LifecycleFailure>,
) {
    let result = match phase {
        LifecyclePhase::Enable => effect.enable(subject),
        LifecyclePhase::Disable => effect.disable(subject),
        LifecyclePhase::Reload => effect.reload(subject),
    };

    if let Err(e) = result {
        counter!("effect_lifecycle_failures_total", "phase" => phase.to_string()).increment(1);
        error!(
            phase = %phase,
            effect = effect.effect_id(),
            context = effect.context(),
            error = %e,
            "效果生命周期回调失败"
        );
        failures.push(LifecycleFailure {
            phase,
            block: effect.id(),
            effect: effect.effect_id().to_string(),
            error: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::{FnHolderProvider, Holder};
    use crate::subject::SimpleSubject;
    use crate::testing::TestKit;
    use serde_json::json;
    use std::time::Duration;

    fn record(name: &str, gate: Option<&str>) -> serde_json::Value {
        match gate {
            Some(permission) => json!({
                "id": "record",
                "args": { "name": name },
                "conditions": [ { "id": "has_permission", "args": { "permission": permission } } ]
            }),
            None => json!({ "id": "record", "args": { "name": name } }),
        }
    }

    fn setup(holders: Vec<Arc<Holder>>) -> ActiveEffectResolver {
        let cache = Arc::new(HolderResolver::new(Duration::ZERO));
        cache.register_provider(Arc::new(FnHolderProvider::new(move |_: &dyn Subject| {
            holders.iter().cloned().map(ProvidedHolder::new).collect()
        })));
        ActiveEffectResolver::new(cache)
    }

    fn holder(kit: &TestKit, id: &str, effects: Vec<serde_json::Value>) -> Arc<Holder> {
        kit.compiler()
            .compile_holder(&kit.section(json!({ "id": id, "effects": effects })), "test")
            .unwrap()
    }

    #[test]
    fn test_disable_before_enable_then_reload_all() {
        let kit = TestKit::new();
        let h = holder(
            &kit,
            "h",
            vec![record("a", Some("pa")), record("b", Some("pb"))],
        );
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        subject.add_base_permission("pa");
        let report = resolver.update_effects(&subject);
        assert_eq!(report.added.len(), 1);
        assert_eq!(kit.take_log(), vec!["enable:a", "reload:a"]);

        // pa 失去、pb 获得：禁用必须先于启用
        subject.remove_base_permission("pa");
        subject.add_base_permission("pb");
        let report = resolver.update_effects(&subject);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.added.len(), 1);
        assert_eq!(kit.take_log(), vec!["disable:a", "enable:b", "reload:b"]);
    }

    #[test]
    fn test_no_change_only_reloads() {
        let kit = TestKit::new();
        let h = holder(&kit, "h", vec![record("a", None), record("b", None)]);
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        resolver.update_effects(&subject);
        kit.take_log();

        let report = resolver.update_effects(&subject);
        assert!(!report.changed());
        assert_eq!(report.reloaded, 2);

        let mut log = kit.take_log();
        log.sort();
        assert_eq!(log, vec!["reload:a", "reload:b"]);
    }

    #[test]
    fn test_empty_holders_are_omitted() {
        let kit = TestKit::new();
        let gated = holder(&kit, "gated", vec![record("a", Some("nobody"))]);
        let open = holder(&kit, "open", vec![record("b", None)]);
        let resolver = setup(vec![gated, open]);
        let subject = SimpleSubject::new("steve");

        let active = resolver.compute_active(&subject);
        assert_eq!(active.len(), 1);
        let (_, provided) = active.iter().next().unwrap();
        assert_eq!(provided.holder().id(), "open");
        assert!(active.iter().all(|(effects, _)| !effects.is_empty()));
    }

    #[test]
    fn test_shared_effect_is_enabled_once() {
        let kit = TestKit::new();
        let shared = kit
            .compiler()
            .compile_effect(&kit.section(record("shared", None)), "shared")
            .unwrap();
        let a = Arc::new(Holder::new("a", vec![shared.clone()], Vec::new()));
        let b = Arc::new(Holder::new("b", vec![shared.clone()], Vec::new()));
        let resolver = setup(vec![a, b]);
        let subject = SimpleSubject::new("steve");

        let report = resolver.update_effects(&subject);
        assert_eq!(report.added.len(), 1);
        assert_eq!(kit.take_log(), vec!["enable:shared", "reload:shared"]);
        assert_eq!(resolver.active_effects(subject.id()).len(), 1);
        assert!(resolver
            .provided_active_effects(subject.id())
            .holder_for(&shared)
            .is_some());
    }

    #[test]
    fn test_lifecycle_failures_are_isolated() {
        let kit = TestKit::new();
        let h = holder(
            &kit,
            "h",
            vec![
                json!({ "id": "record", "args": { "name": "bad", "error_on": "enable" } }),
                record("good", None),
            ],
        );
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        let report = resolver.update_effects(&subject);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, LifecyclePhase::Enable);

        let log = kit.take_log();
        assert!(log.contains(&"enable:good".to_string()));
        assert!(log.contains(&"reload:bad".to_string()));
    }

    #[test]
    fn test_disable_failure_is_isolated() {
        let kit = TestKit::new();
        let h = holder(
            &kit,
            "h",
            vec![
                json!({
                    "id": "record",
                    "args": { "name": "bad", "error_on": "disable" },
                    "conditions": [ { "id": "has_permission", "args": { "permission": "p" } } ]
                }),
                record("good", Some("p")),
            ],
        );
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        subject.add_base_permission("p");
        resolver.update_effects(&subject);
        kit.take_log();

        subject.remove_base_permission("p");
        let report = resolver.update_effects(&subject);
        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, LifecyclePhase::Disable);
        assert_eq!(kit.take_log(), vec!["disable:good"]);
        // 禁用失败的效果同样移出生效集合
        assert!(resolver.active_effects(subject.id()).is_empty());
    }

    #[test]
    fn test_reload_failure_is_isolated() {
        let kit = TestKit::new();
        let h = holder(
            &kit,
            "h",
            vec![
                json!({ "id": "record", "args": { "name": "bad", "error_on": "reload" } }),
                record("good", None),
            ],
        );
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        let report = resolver.update_effects(&subject);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, LifecyclePhase::Reload);

        let log = kit.take_log();
        assert!(log.contains(&"enable:bad".to_string()));
        assert!(log.contains(&"reload:good".to_string()));
        assert!(!log.contains(&"reload:bad".to_string()));

        // 稳定状态下每次更新都重试重载
        let report = resolver.update_effects(&subject);
        assert!(!report.changed());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(kit.take_log(), vec!["reload:good"]);
    }

    #[test]
    fn test_forget_resets_state() {
        let kit = TestKit::new();
        let h = holder(&kit, "h", vec![record("a", None)]);
        let resolver = setup(vec![h]);
        let subject = SimpleSubject::new("steve");

        resolver.update_effects(&subject);
        resolver.forget(subject.id());
        assert!(resolver.active_effects(subject.id()).is_empty());

        kit.take_log();
        resolver.update_effects(&subject);
        assert_eq!(kit.take_log(), vec!["enable:a", "reload:a"]);
    }
}
