//! 单元测试公共设施

use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::context::MOCK_CONTEXT_OPS;

use crate::{Scheduler, TaskId, TaskTable};

/// 把 sync 的架构操作接到线程本地的 Mock 上
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

static HOST_ARCH: HostArch = HostArch;
static REGISTER: std::sync::Once = std::sync::Once::new();
static NEXT_ENTRY: AtomicUsize = AtomicUsize::new(0x8020_0000);

pub fn setup() {
    REGISTER.call_once(|| unsafe { sync::register_arch_ops(&HOST_ARCH) });
    MOCK_ARCH_OPS.reset();
    MOCK_CONTEXT_OPS.reset();
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn leak_table() -> &'static TaskTable {
    leak(TaskTable::new())
}

/// 使用独立任务表的调度器
pub fn leak_sched(time_slice: u32) -> &'static Scheduler {
    setup();
    let sched = Scheduler::new(0, leak_table()).unwrap();
    leak(sched.with_time_slice(time_slice))
}

/// 创建任务并加入就绪队列，每个任务的入口地址不同
pub fn spawn(sched: &Scheduler, name: &'static str) -> TaskId {
    let entry = NEXT_ENTRY.fetch_add(0x100, Ordering::Relaxed);
    let id = sched.tasks().create(name, entry, 0, 0x9000_0000).unwrap();
    sched.add_task(id).unwrap();
    id
}
