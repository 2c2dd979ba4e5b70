pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod summary;
