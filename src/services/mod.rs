pub mod answer_resolver;
pub mod fallback;
pub mod image_preprocessor;
pub mod llm_service;
pub mod ocr_correction;
pub mod ocr_engine;
pub mod recognition_sweep;
pub mod structural_detector;
pub mod text_parser;
pub mod warn_writer;

pub use answer_resolver::{AnswerResolver, ResolverConfig};
pub use fallback::{FallbackChain, FallbackRecognizer, FallbackText};
pub use image_preprocessor::{ImagePreprocessor, PreparedImage, PreprocessConfig};
pub use llm_service::{CompletionProvider, LlmService};
pub use ocr_engine::{OcrEngine, TesseractCli};
pub use recognition_sweep::{RecognitionSweep, SweepConfig, SweepOutcome};
pub use structural_detector::{DetectionStrategy, StructuralDetector};
pub use warn_writer::WarnWriter;
