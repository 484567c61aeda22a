//! 配置目录监控模块
//!
//! 监控配置目录（递归）和当前快照引用的全部密钥文件，
//! 原始文件事件经过防抖动后合并为一次重载信号。
//!
//! 密钥文件通过其所在目录监控：文件被删除或以重命名方式替换后，
//! 目录上的监控仍然有效，文件重新出现时同样会产生事件。

use crate::config::loader::is_hidden;
use crate::error::ConfigError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// 默认防抖动窗口
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// 经过过滤的原始文件事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// 事件涉及的路径
    pub paths: Vec<PathBuf>,
}

/// 防抖动后的重载信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSignal;

/// 事件过滤器，与监控回调共享
#[derive(Debug, Clone)]
struct EventFilter {
    config_dir: PathBuf,
    secret_paths: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl EventFilter {
    /// 配置目录下的任何变化都相关；密钥目录里只关心被引用的文件，
    /// 以及挂载卷原子替换时使用的隐藏条目（如 `..data`）
    fn accepts(&self, paths: &[PathBuf]) -> bool {
        let secrets = self
            .secret_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        paths.iter().any(|path| {
            path.starts_with(&self.config_dir)
                || secrets.contains(path)
                || (is_hidden(path)
                    && secrets.iter().any(|secret| secret.parent() == path.parent()))
        })
    }
}

/// 配置目录监控器
///
/// drop 时释放底层的系统监控资源
pub struct ConfigWatcher {
    /// 配置目录
    config_dir: PathBuf,
    /// 文件系统监控器
    watcher: RecommendedWatcher,
    /// 当前跟踪的密钥文件
    secret_paths: Arc<Mutex<BTreeSet<PathBuf>>>,
    /// 为密钥文件单独监控的目录
    secret_dirs: BTreeSet<PathBuf>,
}

impl ConfigWatcher {
    /// 创建监控器并开始递归监控配置目录
    ///
    /// # 参数
    /// * `config_dir` - 配置目录
    /// * `raw_tx` - 原始事件发送端，交给防抖动任务消费
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 监控器
    pub fn new(
        config_dir: impl AsRef<Path>,
        raw_tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let secret_paths = Arc::new(Mutex::new(BTreeSet::new()));
        let filter = EventFilter {
            config_dir: config_dir.clone(),
            secret_paths: Arc::clone(&secret_paths),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_relevant(&event.kind) || !filter.accepts(&event.paths) {
                    return;
                }
                debug!(kind = ?event.kind, paths = ?event.paths, "检测到文件事件");
                // 接收端关闭说明监控已停止
                let _ = raw_tx.send(WatchEvent { paths: event.paths });
            }
            Err(e) => error!("文件监控事件错误: {}", e),
        })?;

        watcher.watch(&config_dir, RecursiveMode::Recursive)?;
        info!(path = %config_dir.display(), "开始监控配置目录");

        Ok(Self {
            config_dir,
            watcher,
            secret_paths,
            secret_dirs: BTreeSet::new(),
        })
    }

    /// 配置目录
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// 同步密钥文件监控集合
    ///
    /// 每个密钥文件所在的目录非递归监控一次，配置目录内的文件已被递归监控覆盖。
    /// 不再需要的目录取消监控；仍需要的目录重新挂载，目录本身可能被替换过。
    /// 目录不存在时跳过，下次同步再试。
    pub fn sync_secret_paths(&mut self, wanted: &BTreeSet<PathBuf>) {
        let wanted_dirs: BTreeSet<PathBuf> = wanted
            .iter()
            .filter_map(|path| path.parent())
            .filter(|dir| !dir.starts_with(&self.config_dir))
            .map(Path::to_path_buf)
            .collect();

        for stale in self.secret_dirs.difference(&wanted_dirs) {
            if let Err(e) = self.watcher.unwatch(stale) {
                debug!(path = %stale.display(), "取消密钥目录监控失败: {}", e);
            }
        }

        let mut armed = BTreeSet::new();
        for dir in &wanted_dirs {
            if self.secret_dirs.contains(dir) {
                // 旧句柄可能已随目录失效，失败无妨
                let _ = self.watcher.unwatch(dir);
            }
            match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    armed.insert(dir.clone());
                }
                Err(e) => warn!(path = %dir.display(), "监控密钥目录失败: {}", e),
            }
        }

        let tracked: BTreeSet<PathBuf> = wanted
            .iter()
            .filter(|path| {
                path.parent().is_some_and(|dir| {
                    dir.starts_with(&self.config_dir) || armed.contains(dir)
                })
            })
            .cloned()
            .collect();

        debug!(files = tracked.len(), dirs = armed.len(), "密钥文件监控已更新");
        *self
            .secret_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = tracked;
        self.secret_dirs = armed;
    }

    /// 当前监控的全部路径：配置目录加上正在跟踪的密钥文件
    pub fn watched_paths(&self) -> BTreeSet<PathBuf> {
        let mut paths = self
            .secret_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        paths.insert(self.config_dir.clone());
        paths
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        info!(path = %self.config_dir.display(), "配置目录监控已停止");
    }
}

/// 只关心内容和目录结构的变化
fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

/// 防抖动任务
///
/// 收到第一个事件后等待一段静默窗口，窗口内的后续事件会重新计时，
/// 静默结束后发出一次重载信号。信号通道已满说明已有待处理的重载，本次信号可以丢弃。
///
/// # 参数
/// * `raw_rx` - 原始事件接收端
/// * `signal_tx` - 重载信号发送端
/// * `window` - 静默窗口
/// * `shutdown` - 停止信号
pub async fn debounce_events(
    mut raw_rx: mpsc::UnboundedReceiver<WatchEvent>,
    signal_tx: mpsc::Sender<ReloadSignal>,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // 等待一批事件中的第一个
        tokio::select! {
            _ = shutdown.changed() => break,
            event = raw_rx.recv() => match event {
                Some(event) => debug!(paths = ?event.paths, "开始防抖动窗口"),
                None => break,
            },
        }

        let mut merged = 1usize;
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = raw_rx.recv() => match event {
                    Some(_) => merged += 1,
                    None => return,
                },
                _ = tokio::time::sleep(window) => break,
            }
        }

        match signal_tx.try_send(ReloadSignal) {
            Ok(()) => debug!(events = merged, "发出重载信号"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(events = merged, "已有待处理的重载，合并本次变更")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    debug!("防抖动任务已退出");
}
