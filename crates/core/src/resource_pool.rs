//! 轮询资源池
//!
//! 在 `[start, end)` 区间内按轮询顺序分配槽位（例如 Web 终端会话端口），
//! 游标通过 [`CursorStore`] 持久化，进程重启后从上次位置继续。
//! 不跟踪释放与复用，只是一个无限回绕的索引生成器。

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{traits::CursorStore, OrchestratorError, Result};

pub struct ResourcePool {
    name: String,
    start: u64,
    end: u64,
    cursor: Mutex<u64>,
    store: Arc<dyn CursorStore>,
}

impl ResourcePool {
    /// 创建资源池并从存储中恢复游标
    pub async fn load(
        name: impl Into<String>,
        start: u64,
        end: u64,
        store: Arc<dyn CursorStore>,
    ) -> Result<Self> {
        let name = name.into();
        if end <= start {
            return Err(OrchestratorError::Configuration(format!(
                "资源池 {name} 的区间无效: [{start}, {end})"
            )));
        }

        let cursor = store.load(&name).await?.unwrap_or(0);
        info!(
            "资源池 {} 已加载，区间 [{}, {})，游标 {}",
            name, start, end, cursor
        );

        Ok(Self {
            name,
            start,
            end,
            cursor: Mutex::new(cursor),
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> u64 {
        self.end - self.start
    }

    /// 分配下一个槽位，游标先持久化再返回
    pub async fn allocate(&self) -> Result<u64> {
        let mut cursor = self.cursor.lock().await;
        let slot = self.start + (*cursor % self.range());
        let next = cursor.wrapping_add(1);
        self.store.save(&self.name, next).await?;
        *cursor = next;

        debug!("资源池 {} 分配槽位 {}", self.name, slot);
        Ok(slot)
    }

    /// 游标归零，下一次分配从区间起点开始
    pub async fn reset(&self) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        self.store.save(&self.name, 0).await?;
        *cursor = 0;
        info!("资源池 {} 游标已重置", self.name);
        Ok(())
    }

    pub async fn cursor(&self) -> u64 {
        *self.cursor.lock().await
    }
}
