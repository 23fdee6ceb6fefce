//! Mock 实现模块
//!
//! 提供架构层和调度器的 Mock 实现，用于测试
//!
//! 注意：这里不直接依赖 `sync` / `sched` crate（避免循环依赖）。
//! 它们在 `cfg(test)` 下为这些类型实现各自的 trait（例如 `ArchOps`）。

pub mod arch;
pub mod context;
pub mod task;
