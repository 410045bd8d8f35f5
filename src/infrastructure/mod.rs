pub mod js_executor;
pub mod page_handle;

pub use js_executor::{ClickMethod, ElementClicker, JsExecutor};
pub use page_handle::{PageHandle, Selector};
