//! 链执行器
//!
//! 执行器在编译期按名称选定，每个使用点由工厂创建一个独立实例。

use super::Chain;
use crate::trigger::DispatchedTrigger;
use metrics::counter;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// 链执行策略
///
/// 给定有序组件列表和一次触发，决定调用哪些组件、调用多少个，并给出一个汇总结果。
/// 调用顺序和是否短路由具体实现在文档中明确说明，调用方不得依赖迭代器组合子的隐含行为。
pub trait ChainExecutor: Send + Sync {
    fn execute(&self, chain: &Chain, trigger: &DispatchedTrigger) -> bool;
}

/// 执行器工厂
pub trait ChainExecutorFactory: Send + Sync {
    fn id(&self) -> &str;

    fn create(&self) -> Box<dyn ChainExecutor>;
}

fn record(executor: &'static str, chain: &Chain, success: bool) {
    counter!(
        "chain_executions_total",
        "executor" => executor,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    debug!(executor, chain = chain.id(), success, "效果链执行完成");
}

/// `normal`：按顺序逐个调用组件，遇到第一个失败的组件立即停止
///
/// 失败组件之后的组件不会被调用；只有全部组件成功时结果为 `true`。
pub struct NormalExecutor;

impl ChainExecutor for NormalExecutor {
    fn execute(&self, chain: &Chain, trigger: &DispatchedTrigger) -> bool {
        let mut success = true;
        for component in chain.components() {
            if !component.trigger(trigger) {
                success = false;
                break;
            }
        }
        record("normal", chain, success);
        success
    }
}

pub struct NormalExecutorFactory;

impl ChainExecutorFactory for NormalExecutorFactory {
    fn id(&self) -> &str {
        "normal"
    }

    fn create(&self) -> Box<dyn ChainExecutor> {
        Box::new(NormalExecutor)
    }
}

/// `random`：均匀随机选择一个组件调用，结果即该组件的结果
pub struct RandomExecutor;

impl ChainExecutor for RandomExecutor {
    fn execute(&self, chain: &Chain, trigger: &DispatchedTrigger) -> bool {
        if chain.is_empty() {
            return false;
        }
        let index = rand::rng().random_range(0..chain.len());
        let success = chain.components()[index].trigger(trigger);
        record("random", chain, success);
        success
    }
}

pub struct RandomExecutorFactory;

impl ChainExecutorFactory for RandomExecutorFactory {
    fn id(&self) -> &str {
        "random"
    }

    fn create(&self) -> Box<dyn ChainExecutor> {
        Box::new(RandomExecutor)
    }
}

/// `cycle`：每次执行调用下一个组件，轮转顺序由执行器实例自身维护
#[derive(Default)]
pub struct CycleExecutor {
    next: AtomicUsize,
}

impl ChainExecutor for CycleExecutor {
    fn execute(&self, chain: &Chain, trigger: &DispatchedTrigger) -> bool {
        if chain.is_empty() {
            return false;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % chain.len();
        let success = chain.components()[index].trigger(trigger);
        record("cycle", chain, success);
        success
    }
}

pub struct CycleExecutorFactory;

impl ChainExecutorFactory for CycleExecutorFactory {
    fn id(&self) -> &str {
        "cycle"
    }

    fn create(&self) -> Box<dyn ChainExecutor> {
        Box::new(CycleExecutor::default())
    }
}
