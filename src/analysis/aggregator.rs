// 结果聚合器 - 维护当前结果和有界历史记录

use crate::llm::Classification;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 默认历史容量
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
/// 默认入选阈值（严格大于）
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.6;

/// 历史记录条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub classification: Classification,
    /// 采集时间戳（毫秒）
    pub captured_at: i64,
}

/// 有界历史记录，最新的在前
#[derive(Clone, Debug)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 插入新条目，达到容量时淘汰最旧的一条
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_back()
        } else {
            None
        };
        self.entries.push_front(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// 结果聚合器
pub struct ResultAggregator {
    current: Option<Classification>,
    history: History,
    threshold: f64,
    /// 连续失败次数
    consecutive_errors: u32,
}

impl ResultAggregator {
    pub fn new(capacity: usize, threshold: f64) -> Self {
        Self {
            current: None,
            history: History::new(capacity),
            threshold,
            consecutive_errors: 0,
        }
    }

    /// 是否满足入选条件：非占位标签且置信度严格大于阈值
    pub fn accepts(&self, classification: &Classification) -> bool {
        !classification.is_placeholder() && classification.confidence > self.threshold
    }

    /// 接收一次识别结果，返回是否写入历史
    pub fn ingest(&mut self, classification: Classification, captured_at: i64) -> bool {
        if classification.is_error() {
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        } else {
            self.consecutive_errors = 0;
        }

        let accepted = self.accepts(&classification);
        if accepted {
            self.history.push(HistoryEntry {
                classification: classification.clone(),
                captured_at,
            });
        }

        self.current = Some(classification);
        accepted
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Classification> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_ACCEPTANCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(label: &str, confidence: f64) -> Classification {
        Classification {
            label: label.to_string(),
            confidence,
            description: format!("{} gesture", label),
            glyph: "✊".to_string(),
            suggested_action: None,
        }
    }

    #[test]
    fn test_acceptance_threshold_is_strict() {
        let mut aggregator = ResultAggregator::default();

        assert!(aggregator.ingest(gesture("Fist", 0.61), 1));
        assert!(!aggregator.ingest(gesture("Fist", 0.60), 2));
        assert!(!aggregator.ingest(gesture("None", 0.95), 3));
        assert!(!aggregator.ingest(gesture("none", 0.95), 4));
        assert!(!aggregator.ingest(Classification::error_sentinel(), 5));

        assert_eq!(aggregator.history().len(), 1);
        assert_eq!(aggregator.history().to_vec()[0].captured_at, 1);
    }

    #[test]
    fn test_current_tracks_every_result() {
        let mut aggregator = ResultAggregator::default();

        aggregator.ingest(gesture("Peace Sign", 0.9), 1);
        assert_eq!(aggregator.current().unwrap().label, "Peace Sign");

        aggregator.ingest(gesture("None", 0.99), 2);
        assert_eq!(aggregator.current().unwrap().label, "None");

        aggregator.ingest(Classification::error_sentinel(), 3);
        assert!(aggregator.current().unwrap().is_error());

        aggregator.clear_current();
        assert!(aggregator.current().is_none());
        assert_eq!(aggregator.history().len(), 1);
    }

    #[test]
    fn test_history_evicts_oldest_at_capacity() {
        let mut aggregator = ResultAggregator::default();

        for i in 0..25 {
            aggregator.ingest(gesture("Fist", 0.9), i);
            assert!(aggregator.history().len() <= DEFAULT_HISTORY_CAPACITY);
        }

        let entries = aggregator.history().to_vec();
        assert_eq!(entries.len(), 20);
        // 最新的在前，最旧的 0..5 已被淘汰
        assert_eq!(entries.first().unwrap().captured_at, 24);
        assert_eq!(entries.last().unwrap().captured_at, 5);
    }

    #[test]
    fn test_history_push_reports_eviction() {
        let mut history = History::new(2);
        let entry = |ts| HistoryEntry {
            classification: gesture("Wave", 0.8),
            captured_at: ts,
        };

        assert!(history.push(entry(1)).is_none());
        assert!(history.push(entry(2)).is_none());
        assert_eq!(history.push(entry(3)).map(|e| e.captured_at), Some(1));
    }

    #[test]
    fn test_no_deduplication() {
        let mut aggregator = ResultAggregator::default();
        aggregator.ingest(gesture("Thumbs Up", 0.8), 1);
        aggregator.ingest(gesture("Thumbs Up", 0.8), 2);
        assert_eq!(aggregator.history().len(), 2);
    }

    #[test]
    fn test_consecutive_error_count() {
        let mut aggregator = ResultAggregator::default();
        aggregator.ingest(Classification::error_sentinel(), 1);
        aggregator.ingest(Classification::error_sentinel(), 2);
        assert_eq!(aggregator.consecutive_errors(), 2);

        aggregator.ingest(gesture("None", 0.5), 3);
        assert_eq!(aggregator.consecutive_errors(), 0);
    }
}
