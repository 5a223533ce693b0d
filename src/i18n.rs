//! Message table for CLI headings and prompts.

use clap::ValueEnum;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::En => write!(f, "en"),
            Language::Zh => write!(f, "zh"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Organizing,
    Scanning,
    Classifying,
    PreviewNotice,
    PlanHeading,
    Summary,
    ConfirmCommit,
    ConfirmEntry,
    Aborted,
    NothingToDo,
    Committed,
    Undoing,
    UndoDone,
    UndoPartial,
    NoHistory,
    Analysis,
    Cancelled,
    Interrupted,
    PendingJournal,
    CategoryColumn,
    FilesColumn,
    TotalRow,
    Moved,
    WouldMove,
    AlreadyApplied,
    Conflicts,
    Failed,
    ClassifiedByAi,
    Degraded,
    SkippedSize,
    SkippedType,
    AverageConfidence,
}

impl Language {
    pub fn text(self, message: Message) -> &'static str {
        use Message::*;
        match (self, message) {
            (Language::En, Organizing) => "Organizing directory",
            (Language::En, Scanning) => "Scanning files",
            (Language::En, Classifying) => "Classifying",
            (Language::En, PreviewNotice) => "Preview only: no files will be moved",
            (Language::En, PlanHeading) => "PLANNED MOVES",
            (Language::En, Summary) => "SUMMARY",
            (Language::En, ConfirmCommit) => "Move these files?",
            (Language::En, ConfirmEntry) => "Move",
            (Language::En, Aborted) => "Aborted; nothing was moved",
            (Language::En, NothingToDo) => "Nothing to organize",
            (Language::En, Committed) => "Transaction committed",
            (Language::En, Undoing) => "Undoing last organization in",
            (Language::En, UndoDone) => "Undo complete",
            (Language::En, UndoPartial) => "Undo incomplete; run undo again after resolving",
            (Language::En, NoHistory) => "No organization to undo",
            (Language::En, Analysis) => "ANALYSIS",
            (Language::En, Cancelled) => "Interrupted; remaining files were left in place",
            (Language::En, Interrupted) => {
                "An earlier run was interrupted before it was logged; its moves are now recorded"
            }
            (Language::En, PendingJournal) => {
                "An earlier run was interrupted before it was logged; run organize or undo to record it"
            }
            (Language::En, CategoryColumn) => "Category",
            (Language::En, FilesColumn) => "Files",
            (Language::En, TotalRow) => "Total",
            (Language::En, Moved) => "moved",
            (Language::En, WouldMove) => "would move",
            (Language::En, AlreadyApplied) => "already applied",
            (Language::En, Conflicts) => "conflicts",
            (Language::En, Failed) => "failed",
            (Language::En, ClassifiedByAi) => "ai",
            (Language::En, Degraded) => "degraded",
            (Language::En, SkippedSize) => "skipped (size)",
            (Language::En, SkippedType) => "skipped (type)",
            (Language::En, AverageConfidence) => "avg confidence",

            (Language::Zh, Organizing) => "正在整理目录",
            (Language::Zh, Scanning) => "正在扫描文件",
            (Language::Zh, Classifying) => "正在分类",
            (Language::Zh, PreviewNotice) => "预览模式：不会移动任何文件",
            (Language::Zh, PlanHeading) => "计划移动",
            (Language::Zh, Summary) => "汇总",
            (Language::Zh, ConfirmCommit) => "确认移动这些文件？",
            (Language::Zh, ConfirmEntry) => "移动",
            (Language::Zh, Aborted) => "已取消，未移动任何文件",
            (Language::Zh, NothingToDo) => "没有需要整理的文件",
            (Language::Zh, Committed) => "事务已提交",
            (Language::Zh, Undoing) => "正在撤销上次整理：",
            (Language::Zh, UndoDone) => "撤销完成",
            (Language::Zh, UndoPartial) => "撤销未完成，请解决冲突后再次撤销",
            (Language::Zh, NoHistory) => "没有可撤销的整理记录",
            (Language::Zh, Analysis) => "分析结果",
            (Language::Zh, Cancelled) => "已中断，其余文件保持原位",
            (Language::Zh, Interrupted) => "上次运行在记录前中断，其移动现已记入历史",
            (Language::Zh, PendingJournal) => "上次运行在记录前中断，请运行 organize 或 undo 以记入历史",
            (Language::Zh, CategoryColumn) => "类别",
            (Language::Zh, FilesColumn) => "文件",
            (Language::Zh, TotalRow) => "合计",
            (Language::Zh, Moved) => "已移动",
            (Language::Zh, WouldMove) => "将移动",
            (Language::Zh, AlreadyApplied) => "已完成",
            (Language::Zh, Conflicts) => "冲突",
            (Language::Zh, Failed) => "失败",
            (Language::Zh, ClassifiedByAi) => "AI 分类",
            (Language::Zh, Degraded) => "降级",
            (Language::Zh, SkippedSize) => "跳过（大小）",
            (Language::Zh, SkippedType) => "跳过（类型）",
            (Language::Zh, AverageConfidence) => "平均置信度",
        }
    }
}
