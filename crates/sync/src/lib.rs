//! 同步原语
//!
//! 向其它内核模块提供基本的锁和同步原语：
//! - [`SpinLock`]：屏蔽本地中断的自旋锁，可在中断上下文与任务上下文中使用；
//! - [`InterruptibleSpinLock`]：不屏蔽中断、改为禁止持有者被抢占的自旋锁，仅限任务上下文；
//! - [`IntrGuard`]：中断保护器；
//! - [`PreemptGuard`] / [`preempt_disable`] / [`preempt_enable`]：抢占控制协议。
//!
//! # 架构依赖
//!
//! 此 crate 通过 `ArchOps` trait 抽象架构相关操作，使用前必须调用
//! [`register_arch_ops`] 注册实现。
//!
//! 可中断自旋锁需要知道“当前任务”，这一信息由调度器通过 [`TaskOps`] 提供
//! （见 [`register_task_ops`]）。在调度器注册之前（启动早期），所有锁都按
//! “没有当前任务”处理：不记账抢占计数，也不会失败。

#![no_std]

mod interruptible_spin_lock;
mod intr_guard;
mod preempt;
mod raw_spin_lock;
mod spin_lock;

pub use interruptible_spin_lock::*;
pub use intr_guard::*;
pub use preempt::{PreemptGuard, preempt_count, preempt_disable, preempt_enable};
pub use raw_spin_lock::*;
pub use spin_lock::*;

use core::num::NonZeroU64;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核的架构层实现并注册，提供中断控制和 CPU 信息
pub trait ArchOps: Send + Sync {
    /// 读取当前 CPU 的中断使能状态并禁用中断
    ///
    /// 返回调用前中断是否处于启用状态。
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用，并在之后按返回值恢复中断状态
    unsafe fn read_and_disable_interrupts(&self) -> bool;

    /// 启用当前 CPU 的中断
    ///
    /// # Safety
    /// 调用者必须确保此时允许中断到来（例如没有持有屏蔽中断的锁）
    unsafe fn enable_interrupts(&self);

    /// 当前 CPU 的中断是否处于启用状态
    fn interrupts_enabled(&self) -> bool;

    /// 自旋等待时的 CPU 提示（pause/relax）
    fn cpu_relax(&self) {
        core::hint::spin_loop();
    }

    /// 获取当前 CPU ID
    fn cpu_id(&self) -> usize;

    /// 获取最大 CPU 数量
    fn max_cpu_count(&self) -> usize;
}

/// 任务句柄
///
/// 调度器任务 ID 的不透明编码，sync 只负责传递，不解释其内容。
/// 句柄是非拥有的弱引用：任务销毁后再使用该句柄由调度器负责检测。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(NonZeroU64);

impl TaskHandle {
    /// 由非零编码构造句柄
    pub const fn new(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    /// 由原始编码构造句柄，0 表示“没有任务”
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// 返回原始编码
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// 任务相关操作的 trait
///
/// 由调度器实现并注册。可中断自旋锁和抢占控制协议通过它找到当前任务，
/// 并修改该任务的抢占禁用计数。
///
/// 实现必须满足：
/// - 不分配内存、不阻塞、不获取可能被当前任务持有的锁；
/// - 开中断与关中断时都可以调用。
pub trait TaskOps: Send + Sync {
    /// 当前任务；启动早期（第一个任务运行之前）返回 `None`
    fn current_task(&self) -> Option<TaskHandle>;

    /// 将任务的抢占禁用计数加一
    fn preempt_disable(&self, task: TaskHandle);

    /// 将任务的抢占禁用计数减一
    fn preempt_enable(&self, task: TaskHandle);

    /// 读取任务的抢占禁用计数
    fn preempt_count(&self, task: TaskHandle) -> usize;
}

/// 全局架构操作实例（存储 fat pointer 的两个部分）
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 全局任务操作实例
static TASK_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static TASK_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: transmute 在这里是安全的，因为 fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 注册任务操作实现
///
/// 调度器在全局状态初始化完成、第一次中断到来之前调用。
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_task_ops(ops: &'static dyn TaskOps) {
    let ptr = ops as *const dyn TaskOps;
    // SAFETY: 同 register_arch_ops
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn TaskOps, (usize, usize)>(ptr) };
    TASK_OPS_VTABLE.store(vtable, Ordering::Release);
    TASK_OPS_DATA.store(data, Ordering::Release);
}

/// 获取架构操作实例
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::arch::MOCK_ARCH_OPS;
        }
        #[cfg(not(test))]
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

/// 获取任务操作实例，尚未注册时返回 `None`
#[inline]
pub(crate) fn task_ops() -> Option<&'static dyn TaskOps> {
    let data = TASK_OPS_DATA.load(Ordering::Acquire);
    let vtable = TASK_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return Some(&test_support::mock::task::MOCK_TASK_OPS);
        }
        #[cfg(not(test))]
        return None;
    }
    // SAFETY: data 和 vtable 是通过 register_task_ops 设置的有效指针
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn TaskOps>((data, vtable)) })
}

/// 当前 CPU ID
#[inline]
pub fn cpu_id() -> usize {
    arch_ops().cpu_id()
}

/// 最大 CPU 数量
#[inline]
pub fn max_cpu_count() -> usize {
    arch_ops().max_cpu_count()
}

/// 当前 CPU 的中断是否处于启用状态
#[inline]
pub fn interrupts_enabled() -> bool {
    arch_ops().interrupts_enabled()
}

/// 当前任务的句柄
///
/// 启动早期、或调度器尚未注册 [`TaskOps`] 时返回 `None`。
/// 开关中断状态下都可以调用，不会阻塞或分配内存。
#[inline]
pub fn current_task() -> Option<TaskHandle> {
    task_ops().and_then(|ops| ops.current_task())
}
