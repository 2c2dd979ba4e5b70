pub mod engine;

pub use engine::cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use engine::dispatch::{DispatchLoop, LoopSettings, LoopState};
pub use engine::error::EngineError;
pub use engine::summary::{RunSummary, StopReason};
