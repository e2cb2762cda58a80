use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use orchestrator_core::traits::CursorStore;
use orchestrator_core::Result;

/// 基于JSON文件的游标存储
///
/// 文件内容为 `{"<资源池名称>": <游标>}`。每次保存先写临时文件再重命名，
/// 进程在写入途中退出时不会留下半截文件。
pub struct FileCursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, u64>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, name: &str) -> Result<Option<u64>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.get(name).copied())
    }

    async fn save(&self, name: &str, cursor: u64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut cursors = self.read_all().await?;
        cursors.insert(name.to_string(), cursor);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&cursors)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("游标 {} 已保存: {}", name, cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use orchestrator_core::ResourcePool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursors.json"));
        assert_eq!(store.load("session_ports").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load_multiple_names() {
        let dir = TempDir::new().unwrap();
        let store = FileCursorStore::new(dir.path().join("nested").join("cursors.json"));

        store.save("session_ports", 7).await.unwrap();
        store.save("other", 2).await.unwrap();

        let reopened = FileCursorStore::new(dir.path().join("nested").join("cursors.json"));
        assert_eq!(reopened.load("session_ports").await.unwrap(), Some(7));
        assert_eq!(reopened.load("other").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_resource_pool_resumes_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursors.json");

        let pool = ResourcePool::load(
            "session_ports",
            8080,
            8100,
            Arc::new(FileCursorStore::new(&path)),
        )
        .await
        .unwrap();
        assert_eq!(pool.allocate().await.unwrap(), 8080);
        assert_eq!(pool.allocate().await.unwrap(), 8081);
        drop(pool);

        let restarted = ResourcePool::load(
            "session_ports",
            8080,
            8100,
            Arc::new(FileCursorStore::new(&path)),
        )
        .await
        .unwrap();
        assert_eq!(restarted.allocate().await.unwrap(), 8082);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursors.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCursorStore::new(&path);
        assert!(store.load("session_ports").await.is_err());
    }
}
