// ==========================================
// Excel 汇总工具 - 进度上报
// ==========================================
// 职责: 定义进度接收 trait,由展示层实现
// 规则: (已处理行数, 总行数) 单调递增; 总数为 0 时视为 100%
// ==========================================

/// 进度接收者
pub trait ProgressSink {
    fn report(&mut self, processed: usize, total: usize);
}

/// 不做任何事的接收者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn report(&mut self, _processed: usize, _total: usize) {}
}

/// 记录全部上报值（测试与调试用）
#[derive(Debug, Default, Clone)]
pub struct RecordingProgress {
    pub reports: Vec<(usize, usize)>,
}

impl ProgressSink for RecordingProgress {
    fn report(&mut self, processed: usize, total: usize) {
        self.reports.push((processed, total));
    }
}

impl RecordingProgress {
    pub fn last(&self) -> Option<(usize, usize)> {
        self.reports.last().copied()
    }
}

/// 完成百分比
pub fn percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        processed as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(4, 4), 100.0);
    }

    #[test]
    fn test_sinks_accept_reports() {
        let mut sinks: Vec<Box<dyn ProgressSink>> =
            vec![Box::new(NoOpProgress), Box::new(RecordingProgress::default())];
        for sink in sinks.iter_mut() {
            sink.report(0, 2);
            sink.report(2, 2);
        }

        let mut recording = RecordingProgress::default();
        recording.report(1, 3);
        assert_eq!(recording.last(), Some((1, 3)));
    }
}
