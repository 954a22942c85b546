//! 核心：错误类型与关闭信号

pub mod error;
pub mod shutdown;

pub use error::OptimizeError;
pub use shutdown::ShutdownManager;
