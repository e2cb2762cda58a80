use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{traits::JobStrategy, OrchestratorError, Result};

/// 服务类型 -> 执行策略 注册表
pub struct StrategyRegistry {
    strategies: Arc<RwLock<HashMap<String, Arc<dyn JobStrategy>>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, service_type: impl Into<String>, strategy: Arc<dyn JobStrategy>) {
        let mut registry = self.strategies.write().await;
        registry.insert(service_type.into(), strategy);
    }

    pub async fn register_batch(&self, strategies: Vec<(String, Arc<dyn JobStrategy>)>) {
        let mut registry = self.strategies.write().await;
        for (service_type, strategy) in strategies {
            registry.insert(service_type, strategy);
        }
    }

    pub async fn get(&self, service_type: &str) -> Option<Arc<dyn JobStrategy>> {
        let registry = self.strategies.read().await;
        registry.get(service_type).cloned()
    }

    /// 查找执行策略，未注册时返回配置类错误
    pub async fn resolve(&self, service_type: &str) -> Result<Arc<dyn JobStrategy>> {
        self.get(service_type)
            .await
            .ok_or_else(|| OrchestratorError::StrategyNotFound {
                service_type: service_type.to_string(),
            })
    }

    pub async fn contains(&self, service_type: &str) -> bool {
        let registry = self.strategies.read().await;
        registry.contains_key(service_type)
    }

    pub async fn list_service_types(&self) -> Vec<String> {
        let registry = self.strategies.read().await;
        let mut types: Vec<String> = registry.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn unregister(&self, service_type: &str) -> bool {
        let mut registry = self.strategies.write().await;
        registry.remove(service_type).is_some()
    }

    pub async fn count(&self) -> usize {
        let registry = self.strategies.read().await;
        registry.len()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
