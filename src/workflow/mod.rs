pub mod outcome;
pub mod question_ctx;
pub mod question_flow;

pub use outcome::{QuestionOutcome, RunStats};
pub use question_ctx::QuestionCtx;
pub use question_flow::{AnswerTarget, QuestionFlow};
