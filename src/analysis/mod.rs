// 分析模块 - 识别结果的入选策略与历史记录

pub mod aggregator;

pub use aggregator::{History, HistoryEntry, ResultAggregator};
