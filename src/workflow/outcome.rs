//! 单题结果与运行统计

use crate::error::ErrorKind;
use crate::infrastructure::ClickMethod;
use crate::models::question::MatchStrategy;

/// 单道题的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// 已确定答案
    Answered {
        index: usize,
        strategy: MatchStrategy,
        /// 自动作答时实际使用的点击方式，没有点击时为 `None`
        clicked: Option<ClickMethod>,
    },
    /// 模型给出了回答，但无法映射到任何选项
    Undetermined,
    /// 模型调用失败
    Failed(String),
}

impl QuestionOutcome {
    /// 未作答时对应的失败类别
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            QuestionOutcome::Answered { .. } => None,
            QuestionOutcome::Undetermined => Some(ErrorKind::UnresolvedAnswer),
            QuestionOutcome::Failed(_) => Some(ErrorKind::CollaboratorUnavailable),
        }
    }
}

/// 运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub answered: usize,
    pub clicked: usize,
    pub undetermined: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &QuestionOutcome) {
        self.total += 1;
        match outcome {
            QuestionOutcome::Answered { clicked, .. } => {
                self.answered += 1;
                if clicked.is_some() {
                    self.clicked += 1;
                }
            }
            QuestionOutcome::Undetermined => self.undetermined += 1,
            QuestionOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// 合并另一份统计
    pub fn merge(&mut self, other: RunStats) {
        self.total += other.total;
        self.answered += other.answered;
        self.clicked += other.clicked;
        self.undetermined += other.undetermined;
        self.failed += other.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut stats = RunStats::default();
        stats.record(&QuestionOutcome::Answered {
            index: 1,
            strategy: MatchStrategy::Letter,
            clicked: Some(ClickMethod::Script),
        });
        stats.record(&QuestionOutcome::Answered {
            index: 0,
            strategy: MatchStrategy::Fuzzy,
            clicked: None,
        });
        stats.record(&QuestionOutcome::Undetermined);
        stats.record(&QuestionOutcome::Failed("timeout".to_string()));

        assert_eq!(
            stats,
            RunStats {
                total: 4,
                answered: 2,
                clicked: 1,
                undetermined: 1,
                failed: 1,
            }
        );

        assert_eq!(
            QuestionOutcome::Undetermined.error_kind(),
            Some(ErrorKind::UnresolvedAnswer)
        );

        let mut sum = RunStats::default();
        sum.merge(stats);
        sum.merge(stats);
        assert_eq!(sum.total, 8);
    }
}
