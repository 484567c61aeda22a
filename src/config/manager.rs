//! 配置管理器模块
//!
//! 持有当前配置快照并提供无锁读取；驱动加载/重载流水线，
//! 在新快照生效后依次执行已注册的钩子。

use crate::config::hooks::{dispatch_hooks, HookDefinition};
use crate::config::loader::{ConfigLoader, DirectoryConfigLoader, LoadedConfig};
use crate::config::types::Config;
use crate::config::watcher::{debounce_events, ConfigWatcher, ReloadSignal};
use crate::error::ConfigError;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 一次成功加载/重载得到的不可变配置快照
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// 绑定并校验通过的配置
    pub config: Config,
    /// 配置目录
    pub source_dir: PathBuf,
    /// 构建该快照时读取过的密钥文件
    pub secret_paths: BTreeSet<PathBuf>,
    /// 版本号，首次加载为 1，每次成功重载加 1
    pub version: u64,
    /// 生效时间
    pub loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(
        config: Config,
        source_dir: PathBuf,
        secret_paths: BTreeSet<PathBuf>,
        version: u64,
    ) -> Self {
        Self {
            config,
            source_dir,
            secret_paths,
            version,
            loaded_at: Utc::now(),
        }
    }
}

impl Deref for ConfigSnapshot {
    type Target = Config;

    fn deref(&self) -> &Config {
        &self.config
    }
}

/// 管理器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// 尚未成功加载
    Uninitialized,
    /// 已加载，携带当前快照版本
    Loaded { version: u64 },
}

/// 一次成功重载的结果
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    /// 新生效的快照
    pub snapshot: Arc<ConfigSnapshot>,
    /// 耗尽重试后仍失败的钩子
    pub failed_hooks: Vec<String>,
}

/// 配置管理器
pub struct ConfigManager {
    /// 配置加载流水线
    loader: Arc<dyn ConfigLoader>,
    /// 当前快照
    current: ArcSwapOption<ConfigSnapshot>,
    /// 已注册的钩子，按注册顺序执行
    hooks: Mutex<Vec<HookDefinition>>,
    /// 保证同一时刻只有一次重载
    reload_lock: tokio::sync::Mutex<()>,
    /// 快照与监控集合只在该锁内修改
    swap_lock: Mutex<()>,
    /// 运行中的目录监控器
    watcher: Mutex<Option<ConfigWatcher>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// 使用目录加载器创建管理器
    pub fn new() -> Self {
        Self::with_loader(Arc::new(DirectoryConfigLoader::new()))
    }

    /// 使用自定义加载器创建管理器
    pub fn with_loader(loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            loader,
            current: ArcSwapOption::empty(),
            hooks: Mutex::new(Vec::new()),
            reload_lock: tokio::sync::Mutex::new(()),
            swap_lock: Mutex::new(()),
            watcher: Mutex::new(None),
        }
    }

    /// 同步加载配置目录，成功后安装版本 1 的快照
    ///
    /// 不执行钩子；调用方应在加载后直接完成初始化。
    /// 每个管理器只能成功加载一次，之后的更新走 `reload`
    ///
    /// # 参数
    /// * `dir` - 配置目录
    ///
    /// # 返回
    /// * `Result<Arc<ConfigSnapshot>, ConfigError>` - 已生效的快照；已加载或重载进行中时返回 `AlreadyLoaded`
    pub fn load(&self, dir: impl AsRef<Path>) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        // 重载只会在加载成功后发生，拿不到锁说明已经加载过
        let _flight = self
            .reload_lock
            .try_lock()
            .map_err(|_| ConfigError::AlreadyLoaded)?;
        if self.current.load().is_some() {
            return Err(ConfigError::AlreadyLoaded);
        }

        let dir = dir.as_ref().to_path_buf();
        info!(path = %dir.display(), "加载配置目录");

        let loaded = self.loader.load_dir(&dir)?;
        let snapshot = Arc::new(ConfigSnapshot::new(
            loaded.config,
            dir,
            loaded.secret_paths,
            1,
        ));

        let _guard = lock(&self.swap_lock);
        self.current.store(Some(Arc::clone(&snapshot)));
        info!(version = snapshot.version, "配置加载完成");
        Ok(snapshot)
    }

    /// 获取当前配置快照，从不阻塞
    pub fn get_config(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        self.current.load_full().ok_or(ConfigError::NotLoaded)
    }

    /// 当前状态
    pub fn state(&self) -> ManagerState {
        match &*self.current.load() {
            Some(snapshot) => ManagerState::Loaded {
                version: snapshot.version,
            },
            None => ManagerState::Uninitialized,
        }
    }

    /// 注册重载钩子，加载前后均可调用
    pub fn register_hook(&self, definition: HookDefinition) {
        debug!(hook = %definition.name, retry_count = definition.retry_count, "注册配置钩子");
        lock(&self.hooks).push(definition);
    }

    /// 重新运行流水线并原子替换快照
    ///
    /// 失败时保留旧快照、不执行钩子并返回错误；成功时依次执行全部钩子，
    /// 钩子失败只记录在返回结果中
    pub async fn reload(&self) -> Result<ReloadOutcome, ConfigError> {
        let _flight = self.reload_lock.lock().await;

        let previous = self.get_config()?;
        let dir = previous.source_dir.clone();
        debug!(path = %dir.display(), version = previous.version, "开始重载配置");

        let loader = Arc::clone(&self.loader);
        let pipeline_dir = dir.clone();
        let result = tokio::task::spawn_blocking(move || loader.load_dir(&pipeline_dir))
            .await
            .map_err(|e| ConfigError::Task(e.to_string()))
            .and_then(|loaded| loaded);

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(version = previous.version, "配置重载失败，继续使用旧配置: {}", e);
                // 缺失的密钥文件被重新创建时仍需触发重载
                self.rearm_watches();
                return Err(e);
            }
        };

        let snapshot = self.install(loaded, dir, previous.version + 1);
        info!(version = snapshot.version, "配置重载完成");

        let hooks = lock(&self.hooks).clone();
        let failed_hooks = dispatch_hooks(&hooks, &snapshot).await;
        if !failed_hooks.is_empty() {
            warn!(version = snapshot.version, failed = ?failed_hooks, "部分配置钩子执行失败");
        }

        Ok(ReloadOutcome {
            snapshot,
            failed_hooks,
        })
    }

    /// 在交换锁内替换快照并同步监控集合
    fn install(&self, loaded: LoadedConfig, dir: PathBuf, version: u64) -> Arc<ConfigSnapshot> {
        let LoadedConfig {
            config,
            secret_paths,
        } = loaded;
        let snapshot = Arc::new(ConfigSnapshot::new(config, dir, secret_paths, version));

        let _guard = lock(&self.swap_lock);
        self.current.store(Some(Arc::clone(&snapshot)));
        if let Some(watcher) = lock(&self.watcher).as_mut() {
            watcher.sync_secret_paths(&snapshot.secret_paths);
        }
        snapshot
    }

    /// 按当前快照重新挂载密钥监控
    fn rearm_watches(&self) {
        let _guard = lock(&self.swap_lock);
        let Some(current) = self.current.load_full() else {
            return;
        };
        if let Some(watcher) = lock(&self.watcher).as_mut() {
            watcher.sync_secret_paths(&current.secret_paths);
        }
    }

    /// 当前监控的全部路径，未启动监控时为空
    pub fn watched_paths(&self) -> BTreeSet<PathBuf> {
        lock(&self.watcher)
            .as_ref()
            .map(ConfigWatcher::watched_paths)
            .unwrap_or_default()
    }

    /// 启动目录监控、防抖动任务和重载循环
    ///
    /// 必须在 tokio 运行时内、`load` 成功之后调用
    ///
    /// # 参数
    /// * `debounce` - 防抖动窗口
    ///
    /// # 返回
    /// * `Result<WatchHandle, ConfigError>` - 用于停止监控的句柄
    pub fn start_watching(self: &Arc<Self>, debounce: Duration) -> Result<WatchHandle, ConfigError> {
        let snapshot = self.get_config()?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = ConfigWatcher::new(&snapshot.source_dir, raw_tx)?;
        {
            let _guard = lock(&self.swap_lock);
            // 监控器创建期间可能已有重载生效，以最新快照为准
            let current = self.get_config()?;
            watcher.sync_secret_paths(&current.secret_paths);
            *lock(&self.watcher) = Some(watcher);
        }

        // 容量为 1：重载进行中到达的变更只会再排队一次重载
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let debouncer = tokio::spawn(debounce_events(raw_rx, signal_tx, debounce, shutdown_rx));
        let reloader = tokio::spawn(Arc::clone(self).reload_loop(signal_rx));

        info!(debounce_ms = debounce.as_millis() as u64, "配置热重载已启用");
        Ok(WatchHandle {
            manager: Arc::clone(self),
            shutdown_tx,
            debouncer,
            reloader,
        })
    }

    /// 逐个消费重载信号
    async fn reload_loop(self: Arc<Self>, mut signals: mpsc::Receiver<ReloadSignal>) {
        while signals.recv().await.is_some() {
            if let Err(e) = self.reload().await {
                error!("处理配置变更失败: {}", e);
            }
        }
        debug!("重载循环已退出");
    }

    fn stop_watcher(&self) {
        let watcher = lock(&self.watcher).take();
        drop(watcher);
    }
}

/// 监控句柄
pub struct WatchHandle {
    manager: Arc<ConfigManager>,
    shutdown_tx: watch::Sender<bool>,
    debouncer: JoinHandle<()>,
    reloader: JoinHandle<()>,
}

impl WatchHandle {
    /// 停止监控：先停掉监控器和防抖动任务，再等待进行中的重载结束
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.manager.stop_watcher();

        if let Err(e) = self.debouncer.await {
            warn!("防抖动任务异常退出: {}", e);
        }
        // 防抖动任务退出后信号发送端被释放，重载循环处理完剩余信号后自行结束
        if let Err(e) = self.reloader.await {
            warn!("重载任务异常退出: {}", e);
        }
        info!("配置热重载已停止");
    }
}
