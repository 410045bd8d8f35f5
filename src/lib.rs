//! # MCQ Solver
//!
//! 从网页或图片中找出选择题，询问语言模型，并把回答映射回具体选项
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供快照、点击、截图
//! - `PageHandle` - 页面查询 / 遍历接口，检测逻辑只依赖它
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ImagePreprocessor` / `RecognitionSweep` / `FallbackChain` - 图片 → 文本
//! - `text_parser` / `StructuralDetector` - 文本或页面 → 题目
//! - `AnswerResolver` - 模型回答 → 选项索引
//! - `LlmService` / `WarnWriter`
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（来源 + 题目序号）
//! - `QuestionFlow` - 流程编排（prompt → LLM → 匹配 → 作答 → warn）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 按运行模式分派，管理浏览器资源
//! - `orchestrator/page_processor` / `image_processor` - 遍历题目列表
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::BrowserSession;
pub use config::{Config, RunMode};
pub use error::{AppError, AppResult, ErrorKind};
pub use infrastructure::{JsExecutor, PageHandle};
pub use models::{MatchResult, MatchStrategy, Question, QuestionKind, QuestionOption};
pub use orchestrator::App;
pub use services::{AnswerResolver, StructuralDetector};
pub use workflow::{QuestionCtx, QuestionFlow, QuestionOutcome, RunStats};
