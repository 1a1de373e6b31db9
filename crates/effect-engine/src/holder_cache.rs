//! 持有者解析缓存
//!
//! 按主体缓存提供者查询结果，条目在 TTL 内复用。每个主体有独立的锁，
//! 同一主体的并发首次访问只会查询一次提供者并只通知一次观察者，不同主体互不阻塞。

use crate::holder::{HolderProvider, HolderProviders, ProvidedHolder};
use crate::subject::Subject;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// 默认缓存有效期
pub const DEFAULT_HOLDER_TTL: Duration = Duration::from_secs(4);

/// 缓存未命中后的观察者回调
///
/// 回调在持有该主体的缓存锁时同步执行，不能再为同一主体调用 [`HolderResolver::holders`]。
pub type HoldersObserver = Arc<dyn Fn(&dyn Subject, &[ProvidedHolder]) + Send + Sync>;

struct CachedHolders {
    resolved_at: Instant,
    holders: Arc<Vec<ProvidedHolder>>,
}

type Slot = Arc<Mutex<Option<CachedHolders>>>;

/// 持有者解析器
pub struct HolderResolver {
    ttl: Duration,
    providers: HolderProviders,
    observers: RwLock<Vec<HoldersObserver>>,
    slots: DashMap<Uuid, Slot>,
}

impl HolderResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            providers: HolderProviders::new(),
            observers: RwLock::new(Vec::new()),
            slots: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn register_provider(&self, provider: Arc<dyn HolderProvider>) {
        self.providers.register(provider);
    }

    pub fn on_holders_provided<F>(&self, observer: F)
    where
        F: Fn(&dyn Subject, &[ProvidedHolder]) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// 获取主体当前的持有者
    pub fn holders(&self, subject: &dyn Subject) -> Arc<Vec<ProvidedHolder>> {
        let slot = self.slot(subject.id());
        let mut cached = slot.lock();

        if let Some(entry) = cached.as_ref() {
            if entry.resolved_at.elapsed() < self.ttl {
                counter!("holder_cache_hits_total").increment(1);
                return entry.holders.clone();
            }
        }

        counter!("holder_cache_misses_total").increment(1);
        let holders = Arc::new(self.providers.provide(subject));
        debug!(subject = %subject.id(), holders = holders.len(), "重新解析持有者");

        let observers = self.observers.read().clone();
        for observer in &observers {
            observer(subject, &holders);
        }

        *cached = Some(CachedHolders {
            resolved_at: Instant::now(),
            holders: holders.clone(),
        });
        holders
    }

    /// 使主体的缓存立即失效，下次访问重新查询提供者
    pub fn force_rescan(&self, subject_id: Uuid) {
        let slot = self.slots.get(&subject_id).map(|slot| slot.clone());
        if let Some(slot) = slot {
            *slot.lock() = None;
        }
    }

    /// 移除主体的缓存条目
    pub fn remove(&self, subject_id: Uuid) {
        self.slots.remove(&subject_id);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // 先克隆出槽位再加锁，避免持有分片锁时等待主体锁
    fn slot(&self, subject_id: Uuid) -> Slot {
        self.slots.entry(subject_id).or_default().clone()
    }
}

impl Default for HolderResolver {
    fn default() -> Self {
        Self::new(DEFAULT_HOLDER_TTL)
    }
}
