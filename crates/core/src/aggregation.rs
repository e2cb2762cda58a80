//! 结果汇总
//!
//! 作业运行器和工作流引擎共用的汇总逻辑：把每个单元（设备或节点）的
//! 成功/失败折叠为一个整体结果。空集合视为成功。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::RunResult;

/// 汇总策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// 所有单元都成功才算成功
    #[default]
    AllSucceed,
    /// 任一单元成功即算成功
    AnySucceed,
}

/// 成功/失败计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ResultSummary {
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator {
    policy: AggregationPolicy,
}

impl ResultAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// 折叠任意单元结果
    pub fn fold<I>(&self, outcomes: I) -> (bool, ResultSummary)
    where
        I: IntoIterator<Item = bool>,
    {
        let mut summary = ResultSummary::default();
        for success in outcomes {
            summary.record(success);
        }

        let success = match self.policy {
            _ if summary.total == 0 => true,
            AggregationPolicy::AllSucceed => summary.failed == 0,
            AggregationPolicy::AnySucceed => summary.passed > 0,
        };
        (success, summary)
    }

    /// 折叠设备结果
    pub fn fold_devices(&self, results: &BTreeMap<String, RunResult>) -> (bool, ResultSummary) {
        self.fold(results.values().map(|r| r.success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(outcomes: &[(&str, bool)]) -> BTreeMap<String, RunResult> {
        outcomes
            .iter()
            .map(|(name, ok)| {
                let result = if *ok {
                    RunResult::success("ok", 1)
                } else {
                    RunResult::failure("boom", 1)
                };
                (name.to_string(), result)
            })
            .collect()
    }

    #[test]
    fn test_all_succeed_requires_every_device() {
        let aggregator = ResultAggregator::default();
        let (ok, summary) = aggregator.fold_devices(&results(&[("r1", true), ("r2", true)]));
        assert!(ok);
        assert_eq!(summary.passed, 2);

        let (ok, summary) = aggregator.fold_devices(&results(&[("r1", true), ("r2", false)]));
        assert!(!ok);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn test_any_succeed_needs_one_device() {
        let aggregator = ResultAggregator::new(AggregationPolicy::AnySucceed);
        let (ok, _) = aggregator.fold_devices(&results(&[("r1", false), ("r2", true)]));
        assert!(ok);

        let (ok, _) = aggregator.fold_devices(&results(&[("r1", false), ("r2", false)]));
        assert!(!ok);
    }

    #[test]
    fn test_empty_set_is_success() {
        for policy in [AggregationPolicy::AllSucceed, AggregationPolicy::AnySucceed] {
            let (ok, summary) = ResultAggregator::new(policy).fold(std::iter::empty());
            assert!(ok);
            assert_eq!(summary, ResultSummary::default());
        }
    }

    #[test]
    fn test_policy_deserializes_from_snake_case() {
        let policy: AggregationPolicy = serde_json::from_str("\"any_succeed\"").unwrap();
        assert_eq!(policy, AggregationPolicy::AnySucceed);
    }
}
