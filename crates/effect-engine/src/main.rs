//! 规则运行时宿主
//!
//! 加载定义文件，按固定间隔为每个主体刷新生效效果并分发 `tick` 触发器。

use anyhow::Result;
use effect_engine::definitions::Definitions;
use effect_engine::{Engine, Subject, Trigger, TriggerData};
use reforge_shared::config::AppConfig;
use reforge_shared::observability;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("reforge-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    observability::init(&obs_config)?;

    info!("Starting reforge-engine...");

    let engine = Engine::new(&config.engine);

    let path = &config.engine.definitions_path;
    let definitions = Definitions::load(path).unwrap_or_else(|e| {
        warn!(path = %path, error = %e, "定义文件加载失败，使用空定义");
        Definitions::default()
    });

    let compiled = definitions.compile(&engine, path);
    let (subjects, provider) = compiled.instantiate_subjects(&definitions.subjects);
    engine.register_holder_provider(Arc::new(provider));
    engine.on_holders_provided(|subject, holders| {
        debug!(subject = %subject.name(), holders = holders.len(), "持有者已解析");
    });

    info!(
        subjects = subjects.len(),
        interval_ms = config.engine.update_interval_ms,
        "Engine ready"
    );

    let tick = Trigger::new("tick");
    let mut interval = tokio::time::interval(config.engine.update_interval());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for subject in &subjects {
                    let report = engine.update_effects(subject.as_ref());
                    if report.changed() {
                        info!(
                            subject = %subject.name(),
                            added = report.added.len(),
                            removed = report.removed.len(),
                            "生效效果变化"
                        );
                    }
                    if !report.failures.is_empty() {
                        warn!(subject = %subject.name(), failures = report.failures.len(), "部分效果回调失败");
                    }

                    engine.dispatch(subject.clone(), &tick, TriggerData::new());
                    for message in subject.take_messages() {
                        info!(subject = %subject.name(), message = %message, "主体消息");
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    for subject in &subjects {
        engine.forget_subject(subject.id());
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
