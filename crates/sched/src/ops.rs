//! 上下文操作 trait 定义和注册
//!
//! 调度器不知道寄存器如何保存、栈如何切换，这些由架构层实现 [`ContextOps`]
//! 并在启动时注册。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::TaskContext;

/// 上下文操作
///
/// 架构层需要实现此 trait 并在调用 [`init`](crate::init) 之前注册。
pub trait ContextOps: Send + Sync {
    /// 为新的内核任务构造初始上下文
    ///
    /// 任务第一次被换入时应从 `entry(arg)` 开始执行，栈顶为 `stack_top`。
    fn init_kernel_context(&self, ctx: &mut TaskContext, entry: usize, arg: usize, stack_top: usize);

    /// 把当前执行流保存到 `from`，并从 `to` 恢复执行
    ///
    /// 直到 `from` 所属的任务再次被换入时才返回。
    ///
    /// # Safety
    /// - 两个指针都必须指向有效的 [`TaskContext`]；
    /// - 调用时必须已经禁用中断。
    unsafe fn switch(&self, from: *mut TaskContext, to: *const TaskContext);

    /// 空闲时等待下一个中断
    ///
    /// 调用时中断可能是关闭的；此时有中断挂起也必须返回（RISC-V 的 `wfi` 即如此）。
    fn wait_for_interrupt(&self);

    /// 任务槽位被回收前调用，架构层可在此释放与上下文绑定的资源（例如内核栈）
    fn destroy_context(&self, _ctx: &mut TaskContext) {}
}

static CONTEXT_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static CONTEXT_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册上下文操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_context_ops(ops: &'static dyn ContextOps) {
    let ptr = ops as *const dyn ContextOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ContextOps, (usize, usize)>(ptr) };
    CONTEXT_OPS_VTABLE.store(vtable, Ordering::Release);
    CONTEXT_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的上下文操作实现
///
/// # Panics
/// 如果尚未调用 [`register_context_ops`] 注册实现，则 panic
#[inline]
pub fn context_ops() -> &'static dyn ContextOps {
    let data = CONTEXT_OPS_DATA.load(Ordering::Acquire);
    let vtable = CONTEXT_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::context::MOCK_CONTEXT_OPS;
        }
        #[cfg(not(test))]
        panic!("sched: ContextOps not registered, call register_context_ops first");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ContextOps>((data, vtable)) }
}
