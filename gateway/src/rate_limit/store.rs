//! 限流窗口存储
//!
//! 进程内的固定窗口计数器存储。按约定，状态只属于当前进程：
//! 多实例部署时每个实例各自计数，全局有效配额是
//! `max_requests × 实例数`。这是已知的设计边界，不在此处弥补。

use redmark_errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// 单个计数窗口
///
/// 仅在 `now < reset_at_ms` 期间有效；过期后整体替换，不复用。
#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u64,
    reset_at_ms: u64,
}

/// 限流窗口存储
///
/// 检查路径是同步的：加锁、读改写、解锁，中间没有挂起点。
pub struct RateLimitStore {
    windows: Mutex<HashMap<String, WindowRecord>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 对指定键记一次请求，返回（窗口内计数，窗口重置时间）
    ///
    /// 检查与计数是同一个原子步骤：无论请求最终是否被允许，
    /// 计数都已经加一。窗口不存在或已过期时重建。
    pub fn hit(&self, key: &str, window_ms: u64) -> AppResult<(u64, u64)> {
        self.hit_at(key, window_ms, now_epoch_ms())
    }

    pub(crate) fn hit_at(&self, key: &str, window_ms: u64, now_ms: u64) -> AppResult<(u64, u64)> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::internal("rate limit store lock poisoned"))?;

        let record = windows
            .entry(key.to_string())
            .and_modify(|r| {
                if now_ms >= r.reset_at_ms {
                    // 过期窗口整体替换
                    *r = WindowRecord {
                        count: 0,
                        reset_at_ms: now_ms + window_ms,
                    };
                }
            })
            .or_insert(WindowRecord {
                count: 0,
                reset_at_ms: now_ms + window_ms,
            });

        record.count += 1;
        Ok((record.count, record.reset_at_ms))
    }

    /// 清理所有已过期的窗口，返回删除数量
    ///
    /// 正确性不依赖它（过期窗口在访问时也会被替换），
    /// 只是防止被遗弃的标识无限占用内存。
    pub fn prune_expired(&self) -> usize {
        self.prune_at(now_epoch_ms())
    }

    fn prune_at(&self, now_ms: u64) -> usize {
        let Ok(mut windows) = self.windows.lock() else {
            warn!("Rate limit store lock poisoned, skipping prune");
            return 0;
        };

        let before = windows.len();
        windows.retain(|_, record| now_ms < record.reset_at_ms);
        before - windows.len()
    }

    /// 当前跟踪的窗口数
    pub fn len(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 故意污染内部锁，用于验证失败放行路径
    #[cfg(test)]
    pub(crate) fn poison(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let _ = std::thread::spawn(move || {
            let _guard = store.windows.lock().unwrap();
            panic!("poison rate limit store");
        })
        .join();
    }
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前 Unix 时间（毫秒）
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 周期清理任务
///
/// 由存储的生命周期显式拥有：启动时创建，关停时通过 `stop` 结束，
/// 而不是挂一个无法回收的全局定时器。
pub struct Sweeper {
    shutdown: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

impl Sweeper {
    pub fn start(store: Arc<RateLimitStore>, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let notify = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval 的第一次 tick 立即完成，先消费掉
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.prune_expired();
                        if removed > 0 {
                            debug!(removed, remaining = store.len(), "Pruned expired rate limit windows");
                        }
                    }
                    _ = notify.notified() => {
                        info!("Rate limit sweeper stopped");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// 停止清理任务并等待其退出
    pub async fn stop(self) {
        // notify_one 会保留一个许可：即使任务还没运行到 notified().await，
        // 通知也不会丢失（notify_waiters 只唤醒已注册的等待者）
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}
