//! Periodic stage-entry triggers
//!
//! Each trigger dispatches one sweep task on a fixed interval. The first
//! tick fires immediately; ticks missed while the runtime was busy are
//! skipped rather than replayed in a burst.

use crate::config::ScheduleConfig;
use crate::pipeline::router::TaskRouter;
use crate::pipeline::tasks::{SCHEDULE_CRAWLER_TASK, SCHEDULE_INDEX_TASK, SCHEDULE_PROCESSOR_TASK};
use serde_json::Map;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A sweep task dispatched on a fixed period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub task: &'static str,
    pub period: Duration,
}

/// The crawl, process and index sweeps with their configured periods
pub fn triggers(config: &ScheduleConfig) -> Vec<ScheduledTrigger> {
    vec![
        ScheduledTrigger {
            task: SCHEDULE_CRAWLER_TASK,
            period: Duration::from_secs(config.crawl_interval_secs.max(1)),
        },
        ScheduledTrigger {
            task: SCHEDULE_PROCESSOR_TASK,
            period: Duration::from_secs(config.process_interval_secs.max(1)),
        },
        ScheduledTrigger {
            task: SCHEDULE_INDEX_TASK,
            period: Duration::from_secs(config.index_interval_secs.max(1)),
        },
    ]
}

/// Spawns one timer task per trigger
///
/// The timers stop when `shutdown` turns true or its sender is dropped.
pub fn spawn_scheduler(
    router: TaskRouter,
    config: &ScheduleConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    triggers(config)
        .into_iter()
        .map(|trigger| tokio::spawn(run_trigger(router.clone(), trigger, shutdown.clone())))
        .collect()
}

async fn run_trigger(router: TaskRouter, trigger: ScheduledTrigger, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(trigger.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(task = trigger.task, period_secs = trigger.period.as_secs(), "Trigger armed");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                match router.dispatch(trigger.task, Vec::new(), Map::new()) {
                    Ok(task_id) => tracing::debug!(task = trigger.task, %task_id, "Trigger fired"),
                    Err(e) => tracing::warn!(task = trigger.task, error = %e, "Trigger dispatch failed"),
                }
            }
        }
    }

    tracing::debug!(task = trigger.task, "Trigger stopped");
}
