// 批次结果汇总

use crate::uploader::{UploadTask, UploadTaskStatus};
use serde::Serialize;

/// 一次批次运行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// 成功数
    pub success_count: usize,
    /// 失败数
    pub error_count: usize,
    /// 成功任务的标识，按完成顺序
    pub uploaded_ids: Vec<String>,
    /// 本批次被领取处理的任务索引（领取顺序）
    pub attempted: Vec<usize>,
    /// 批次运行期间是否被取消
    pub cancelled: bool,
}

impl BatchResult {
    /// 汇总本批次的任务状态
    ///
    /// `completion_order` 是成功更新被应用到队列的顺序
    pub fn aggregate(
        tasks: &[UploadTask],
        attempted: &[usize],
        completion_order: &[usize],
        cancelled: bool,
    ) -> Self {
        let status_of = |index: usize| tasks.get(index).map(|t| t.status);

        let success_count = attempted
            .iter()
            .filter(|&&i| status_of(i) == Some(UploadTaskStatus::Success))
            .count();
        let error_count = attempted
            .iter()
            .filter(|&&i| status_of(i) == Some(UploadTaskStatus::Error))
            .count();

        let uploaded_ids = completion_order
            .iter()
            .filter_map(|&i| tasks.get(i))
            .filter(|t| t.status == UploadTaskStatus::Success)
            .filter_map(|t| t.result_id.clone())
            .collect();

        Self {
            success_count,
            error_count,
            uploaded_ids,
            attempted: attempted.to_vec(),
            cancelled,
        }
    }

    /// 本批次处理的任务数
    pub fn total(&self) -> usize {
        self.attempted.len()
    }

    pub fn has_failures(&self) -> bool {
        self.error_count > 0
    }

    /// 全部成功且没有被取消
    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.error_count == 0
    }
}
