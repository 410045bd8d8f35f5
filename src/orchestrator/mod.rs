//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责按运行模式调度流程，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用
//! - 管理应用生命周期（初始化、运行、统计）
//! - 管理浏览器资源（BrowserSession、JsExecutor）
//!
//! ### `page_processor` - 页面处理器
//! - 快照 → 结构检测 → 逐题作答
//! - 检测不到题目时截图，交给图片管道
//!
//! ### `image_processor` - 图片处理器
//! - 预处理与识别扫描放在阻塞线程池
//! - 扫描耗尽时依次尝试兜底识别
//!
//! ## 层次关系
//!
//! ```text
//! app (按 RunMode 分派)
//!     ↓
//! page_processor / image_processor (处理 Vec<Question>)
//!     ↓
//! workflow::QuestionFlow (处理单个 Question)
//!     ↓
//! services (能力层：检测 / 识别 / 匹配 / llm / warn)
//!     ↓
//! infrastructure (基础设施：JsExecutor、PageHandle)
//! ```

pub mod app;
pub mod image_processor;
pub mod page_processor;

pub use app::App;
pub use image_processor::{process_image, ImagePipeline};
pub use page_processor::{answer_questions, process_page};
