//! 集成测试公共设施：把架构层接到 test-support 的 Mock 上，并初始化全局调度器

#![allow(dead_code)]

use std::sync::Once;

use sched::{ContextOps, TaskContext};
use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::context::MOCK_CONTEXT_OPS;

struct HostArch;

impl sync::ArchOps for HostArch {
    unsafe fn read_and_disable_interrupts(&self) -> bool {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn enable_interrupts(&self) {
        unsafe { MOCK_ARCH_OPS.enable_interrupts() }
    }

    fn interrupts_enabled(&self) -> bool {
        MOCK_ARCH_OPS.interrupts_enabled()
    }

    fn cpu_relax(&self) {
        MOCK_ARCH_OPS.cpu_relax()
    }

    fn cpu_id(&self) -> usize {
        MOCK_ARCH_OPS.cpu_id()
    }

    fn max_cpu_count(&self) -> usize {
        MOCK_ARCH_OPS.max_cpu_count()
    }
}

struct HostContext;

impl ContextOps for HostContext {
    fn init_kernel_context(&self, ctx: &mut TaskContext, entry: usize, arg: usize, stack_top: usize) {
        let regs = ctx.as_words_mut();
        regs[0] = entry;
        regs[1] = arg;
        regs[2] = stack_top;
    }

    unsafe fn switch(&self, _from: *mut TaskContext, _to: *const TaskContext) {
        MOCK_CONTEXT_OPS.on_switch();
    }

    fn wait_for_interrupt(&self) {
        MOCK_CONTEXT_OPS.on_wait_for_interrupt(sync::interrupts_enabled());
    }
}

static HOST_ARCH: HostArch = HostArch;
static HOST_CONTEXT: HostContext = HostContext;
static INIT: Once = Once::new();

/// 注册架构操作并初始化调度器（每个测试二进制只执行一次）
pub fn init_once() {
    INIT.call_once(|| {
        unsafe {
            sync::register_arch_ops(&HOST_ARCH);
            sched::register_context_ops(&HOST_CONTEXT);
        }
        sched::init().unwrap();
    });
    MOCK_ARCH_OPS.reset();
    MOCK_CONTEXT_OPS.reset();
}
