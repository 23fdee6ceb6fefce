//! 架构相关操作的 Mock 实现

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

std::thread_local! {
    // 每个测试线程一颗模拟 CPU，上电时中断是开启的
    static INTERRUPTS: Cell<bool> = const { Cell::new(true) };
    static RELAX_COUNT: Cell<usize> = const { Cell::new(0) };
}

/// Mock 架构操作
pub struct MockArchOps {
    pub cpu_id: AtomicUsize,
    pub max_cpus: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            cpu_id: AtomicUsize::new(0),
            max_cpus: AtomicUsize::new(1),
        }
    }

    /// 把当前线程的模拟 CPU 恢复到上电状态
    pub fn reset(&self) {
        INTERRUPTS.with(|i| i.set(true));
        RELAX_COUNT.with(|c| c.set(0));
    }

    /// 直接设置当前线程的中断状态，用于模拟"在中断上下文中"
    pub fn set_interrupts_enabled(&self, enabled: bool) {
        INTERRUPTS.with(|i| i.set(enabled));
    }

    pub unsafe fn read_and_disable_interrupts(&self) -> bool {
        INTERRUPTS.with(|i| i.replace(false))
    }

    pub unsafe fn enable_interrupts(&self) {
        INTERRUPTS.with(|i| i.set(true));
    }

    pub fn interrupts_enabled(&self) -> bool {
        INTERRUPTS.with(|i| i.get())
    }

    pub fn cpu_relax(&self) {
        RELAX_COUNT.with(|c| c.set(c.get() + 1));
        std::thread::yield_now();
    }

    /// 当前线程自旋等待的次数
    pub fn relax_count(&self) -> usize {
        RELAX_COUNT.with(|c| c.get())
    }

    pub fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }

    pub fn max_cpu_count(&self) -> usize {
        self.max_cpus.load(Ordering::Relaxed)
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
