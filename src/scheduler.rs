//! 周期任务调度器模块
//!
//! 定义"每隔固定时间执行一次回调"的调度接口，以及基于 tokio 的默认实现

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// 周期执行的任务
pub type ScheduledTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 运行中的任务数量
    pub running_tasks: usize,
    /// 调度器是否运行中
    pub is_running: bool,
    /// 任务累计执行次数
    pub total_runs: u64,
    /// 最后一次执行时间
    pub last_run: Option<Instant>,
}

/// 任务调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 注册周期任务，同名任务会被替换
    ///
    /// 第一次执行发生在注册后一个间隔之后
    ///
    /// # 参数
    /// * `name` - 任务名称
    /// * `period` - 执行间隔
    /// * `task` - 任务
    async fn schedule(&self, name: &str, period: Duration, task: ScheduledTask) -> Result<()>;

    /// 取消任务，返回任务是否存在
    async fn cancel(&self, name: &str) -> bool;

    /// 停止全部任务
    async fn stop(&self) -> Result<()>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 基于 tokio 的任务调度器
pub struct TokioScheduler {
    /// 运行中的任务
    tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
}

impl TokioScheduler {
    /// 创建新的任务调度器
    pub fn new() -> Self {
        let status = SchedulerStatus {
            running_tasks: 0,
            is_running: false,
            total_runs: 0,
            last_run: None,
        };

        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// 更新调度器状态
    async fn update_status(&self) {
        let tasks = self.tasks.read().await;
        let mut status = self.status.write().await;

        status.running_tasks = tasks.len();
        status.is_running = !tasks.is_empty();
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn schedule(&self, name: &str, period: Duration, task: ScheduledTask) -> Result<()> {
        if period.is_zero() {
            bail!("任务 {name} 的执行间隔不能为0");
        }

        let task_name = name.to_string();
        let status = Arc::clone(&self.status);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            // 上一次执行过慢时不补偿错过的周期
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("启动周期任务: {}，间隔 {:?}", task_name, period);

            loop {
                ticker.tick().await;
                debug!("执行周期任务: {}", task_name);

                task().await;

                let mut guard = status.write().await;
                guard.total_runs += 1;
                guard.last_run = Some(Instant::now());
            }
        });

        {
            let mut tasks = self.tasks.write().await;
            if let Some(previous) = tasks.insert(name.to_string(), handle) {
                previous.abort();
                info!("替换已存在的周期任务: {}", name);
            }
        }

        self.update_status().await;
        Ok(())
    }

    async fn cancel(&self, name: &str) -> bool {
        let removed = {
            let mut tasks = self.tasks.write().await;
            tasks.remove(name)
        };

        let existed = match removed {
            Some(handle) => {
                handle.abort();
                info!("停止周期任务: {}", name);
                true
            }
            None => false,
        };

        self.update_status().await;
        existed
    }

    async fn stop(&self) -> Result<()> {
        info!("停止任务调度器");

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.write().await;
            tasks
                .drain()
                .map(|(name, handle)| {
                    debug!("停止任务: {}", name);
                    handle.abort();
                    handle
                })
                .collect()
        };

        // 等待任务真正退出，被取消的任务返回 JoinError
        futures::future::join_all(handles).await;

        self.update_status().await;
        info!("任务调度器已停止");
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        // 调度器销毁时停止所有任务
        if let Ok(mut tasks) = self.tasks.try_write() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}
