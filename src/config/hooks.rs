//! 配置重载钩子
//!
//! 每次重载成功后按注册顺序依次执行；单个钩子失败只会重试自身，不影响其余钩子。

use crate::config::manager::ConfigSnapshot;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 重载钩子trait
///
/// 实现必须幂等：同一份快照可能因为重试被多次传入
#[async_trait]
pub trait ReloadHook: Send + Sync {
    /// 新配置生效后调用
    async fn on_reload(&self, snapshot: Arc<ConfigSnapshot>) -> anyhow::Result<()>;
}

/// 把同步闭包包装为钩子
pub struct FnHook<F>(pub F);

impl<F> FnHook<F>
where
    F: Fn(Arc<ConfigSnapshot>) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ReloadHook for FnHook<F>
where
    F: Fn(Arc<ConfigSnapshot>) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_reload(&self, snapshot: Arc<ConfigSnapshot>) -> anyhow::Result<()> {
        (self.0)(snapshot)
    }
}

/// 钩子注册信息
#[derive(Clone)]
pub struct HookDefinition {
    /// 钩子名称，用于日志和错误报告
    pub name: String,
    /// 钩子实现
    pub hook: Arc<dyn ReloadHook>,
    /// 首次失败后的重试次数
    pub retry_count: u32,
    /// 两次尝试之间的等待时间
    pub retry_wait_duration: Duration,
}

impl HookDefinition {
    /// 创建不重试的钩子
    pub fn new(name: impl Into<String>, hook: impl ReloadHook + 'static) -> Self {
        Self {
            name: name.into(),
            hook: Arc::new(hook),
            retry_count: 0,
            retry_wait_duration: Duration::ZERO,
        }
    }

    /// 设置重试策略
    pub fn with_retry(mut self, retry_count: u32, retry_wait_duration: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_wait_duration = retry_wait_duration;
        self
    }

    /// 最多尝试次数
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

impl fmt::Debug for HookDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDefinition")
            .field("name", &self.name)
            .field("retry_count", &self.retry_count)
            .field("retry_wait_duration", &self.retry_wait_duration)
            .finish_non_exhaustive()
    }
}

/// 执行单个钩子，失败时按策略重试
///
/// # 参数
/// * `definition` - 钩子注册信息
/// * `snapshot` - 刚生效的配置快照
///
/// # 返回
/// * `Result<(), ConfigError>` - 全部尝试失败时返回 `ConfigError::Hook`
pub async fn run_hook(
    definition: &HookDefinition,
    snapshot: &Arc<ConfigSnapshot>,
) -> Result<(), ConfigError> {
    let max_attempts = definition.max_attempts();
    let mut attempt = 1;

    loop {
        match definition.hook.on_reload(Arc::clone(snapshot)).await {
            Ok(()) => {
                debug!(hook = %definition.name, attempt, "钩子执行成功");
                return Ok(());
            }
            Err(e) if attempt < max_attempts => {
                warn!(hook = %definition.name, attempt, error = %format!("{e:#}"), "钩子执行失败，等待重试");
                tokio::time::sleep(definition.retry_wait_duration).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(ConfigError::Hook {
                    name: definition.name.clone(),
                    attempts: attempt,
                    message: format!("{e:#}"),
                });
            }
        }
    }
}

/// 依次执行全部钩子，返回最终失败的钩子名称
pub async fn dispatch_hooks(hooks: &[HookDefinition], snapshot: &Arc<ConfigSnapshot>) -> Vec<String> {
    let mut failed = Vec::new();
    for definition in hooks {
        if let Err(e) = run_hook(definition, snapshot).await {
            error!(hook = %definition.name, version = snapshot.version, "{}", e);
            failed.push(definition.name.clone());
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Config;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn snapshot() -> Arc<ConfigSnapshot> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "database": { "connectionUrl": { "value": "postgres://localhost/app" } }
        }))
        .unwrap();
        Arc::new(ConfigSnapshot::new(
            config,
            PathBuf::from("conf"),
            BTreeSet::new(),
            2,
        ))
    }

    fn counting_hook(
        counter: Arc<AtomicU32>,
        fail: bool,
    ) -> FnHook<impl Fn(Arc<ConfigSnapshot>) -> anyhow::Result<()> + Send + Sync + 'static> {
        FnHook::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                anyhow::bail!("总是失败")
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let definition = HookDefinition::new("failing", counting_hook(Arc::clone(&calls), true))
            .with_retry(3, Duration::from_millis(1));

        let result = run_hook(&definition, &snapshot()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(ConfigError::Hook { name, attempts, message }) => {
                assert_eq!(name, "failing");
                assert_eq!(attempts, 4);
                assert!(message.contains("总是失败"));
            }
            other => panic!("期望钩子错误, 实际: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let definition = HookDefinition::new(
            "flaky",
            FnHook::new(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("第一次失败");
                }
                Ok(())
            }),
        )
        .with_retry(2, Duration::ZERO);

        assert!(run_hook(&definition, &snapshot()).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_isolated_and_order_kept() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);

        let hooks = vec![
            HookDefinition::new(
                "first",
                FnHook::new(move |_| {
                    first.lock().unwrap().push("first");
                    anyhow::bail!("失败")
                }),
            ),
            HookDefinition::new(
                "second",
                FnHook::new(move |_| {
                    second.lock().unwrap().push("second");
                    Ok(())
                }),
            ),
        ];

        let failed = dispatch_hooks(&hooks, &snapshot()).await;
        assert_eq!(failed, vec!["first".to_string()]);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_hook_receives_snapshot() {
        let seen = Arc::new(AtomicU32::new(0));
        let recorder = Arc::clone(&seen);
        let definition = HookDefinition::new(
            "version",
            FnHook::new(move |snapshot: Arc<ConfigSnapshot>| {
                recorder.store(snapshot.version as u32, Ordering::SeqCst);
                Ok(())
            }),
        );

        run_hook(&definition, &snapshot()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
