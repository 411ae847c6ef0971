//! 内存存储实现模块
//!
//! 用于测试和单进程演示，语义与 PostgreSQL 实现保持一致。

pub mod reading;

pub use reading::*;
