//! 调度器编译期配置

/// 任务表的槽位数量（包括每个 CPU 的 idle 任务）
pub const MAX_TASKS: usize = 64;

/// 支持的最大 CPU 数量
///
/// 目前只在单核上运行，但调度器已经按 CPU 划分，接口保留多核的形状。
pub const MAX_CPUS: usize = 1;

/// 中断分发表的大小
pub const MAX_IRQS: usize = 64;

/// 默认时间片长度（时钟中断次数）
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// 任务上下文的字数
///
/// 足以容纳 RISC-V 的 32 个通用寄存器加 sepc/sstatus；
/// 具体布局由架构层的 `ContextOps` 决定，调度器不解释其内容。
pub const CONTEXT_WORDS: usize = 34;
