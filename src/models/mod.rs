pub mod dom;
pub mod question;

pub use dom::{DomNode, DomSnapshot, DomTree, NodeId};
pub use question::{
    dedup_questions, MatchResult, MatchStrategy, Question, QuestionKind, QuestionOption,
};
