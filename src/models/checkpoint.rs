use serde::{Deserialize, Serialize};

/// 断点：最后一道已完整写入输出文档的题目索引
///
/// 序列化格式为 `{"last_index": n}`，`-1` 表示尚未完成任何题目。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_index: i64,
}

impl Checkpoint {
    pub fn new(last_index: usize) -> Self {
        Self {
            last_index: last_index as i64,
        }
    }

    /// 根据断点计算本次运行的起始索引
    ///
    /// - `0 <= last < total - 1` → `last + 1`
    /// - `last == total - 1` → `total`（已全部完成，无需处理）
    /// - 无断点 / 负数 / 超出题目范围 → 0
    pub fn resume_index(checkpoint: Option<&Checkpoint>, total: usize) -> usize {
        match checkpoint {
            Some(cp) if cp.last_index >= 0 && (cp.last_index as usize) < total => {
                cp.last_index as usize + 1
            }
            _ => 0,
        }
    }
}

/// 单次运行的累计统计（不持久化）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    /// 累计费用（美元）
    pub cumulative_cost: f64,
    /// 本次运行成功处理的题目数
    pub processed_count: usize,
    /// 本次运行失败跳过的题目数
    pub failed_count: usize,
}

impl RunStats {
    pub fn record_success(&mut self, cost: f64) {
        self.cumulative_cost += cost.max(0.0);
        self.processed_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&Checkpoint::new(4)).unwrap();
        assert_eq!(json, r#"{"last_index":4}"#);
        let cp: Checkpoint = serde_json::from_str(r#"{"last_index": -1}"#).unwrap();
        assert_eq!(cp.last_index, -1);
    }

    #[test]
    fn test_resume_index() {
        assert_eq!(Checkpoint::resume_index(None, 5), 0);
        assert_eq!(
            Checkpoint::resume_index(Some(&Checkpoint { last_index: -1 }), 5),
            0
        );
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(0)), 5), 1);
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(3)), 5), 4);
        // 最后一题已提交：无需再处理
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(4)), 5), 5);
        // 同名但题目更多的旧文件留下的断点：从头开始
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(5)), 5), 0);
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(9)), 5), 0);
        assert_eq!(Checkpoint::resume_index(Some(&Checkpoint::new(0)), 0), 0);
    }

    #[test]
    fn test_stats_cost_is_monotonic() {
        let mut stats = RunStats::default();
        stats.record_success(0.00075);
        stats.record_success(-1.0);
        stats.record_failure();
        assert!((stats.cumulative_cost - 0.00075).abs() < 1e-12);
        assert_eq!(stats.processed_count, 2);
        assert_eq!(stats.failed_count, 1);
    }
}
