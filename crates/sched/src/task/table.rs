//! 任务表

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use sync::{InterruptibleSpinLock, SpinLock, SpinLockGuard};

use super::{TaskId, TaskState};
use crate::config::MAX_TASKS;
use crate::{SchedError, TaskContext, context_ops};

/// 任务的可变部分，由任务自己的 [`SpinLock`] 保护
#[derive(Debug)]
pub struct TaskInner {
    /// 任务名，仅用于日志
    pub name: &'static str,
    /// 调度状态
    pub state: TaskState,
    /// 是否在就绪队列中
    pub on_rq: bool,
    /// 剩余时间片
    pub ticks_remaining: u32,
    /// 换出时保存的上下文
    pub context: TaskContext,
    /// 是否为某个 CPU 的 idle 任务
    pub idle: bool,
    /// 被换入的次数
    pub run_count: u64,
}

impl TaskInner {
    const fn empty() -> Self {
        Self {
            name: "",
            state: TaskState::Zombie,
            on_rq: false,
            ticks_remaining: 0,
            context: TaskContext::zeroed(),
            idle: false,
            run_count: 0,
        }
    }
}

/// 任务槽位
///
/// 抢占计数和信号标志是原子量，可以不加锁地从中断上下文和锁实现中访问。
pub struct Task {
    generation: AtomicU32,
    occupied: AtomicBool,
    preempt_count: AtomicUsize,
    signal_pending: AtomicBool,
    inner: SpinLock<TaskInner>,
}

impl Task {
    const fn empty() -> Self {
        Self {
            generation: AtomicU32::new(1),
            occupied: AtomicBool::new(false),
            preempt_count: AtomicUsize::new(0),
            signal_pending: AtomicBool::new(false),
            inner: SpinLock::new(TaskInner::empty()),
        }
    }
}

/// 经过代数校验的任务引用
#[derive(Clone, Copy)]
pub struct TaskRef<'a> {
    id: TaskId,
    task: &'a Task,
}

impl<'a> TaskRef<'a> {
    /// 任务句柄
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// 锁住任务的可变部分
    pub fn inner(&self) -> SpinLockGuard<'a, TaskInner> {
        self.task.inner.lock()
    }

    /// 调度状态
    pub fn state(&self) -> TaskState {
        self.inner().state
    }

    /// 任务名
    pub fn name(&self) -> &'static str {
        self.inner().name
    }

    /// 是否为 idle 任务
    pub fn is_idle(&self) -> bool {
        self.inner().idle
    }

    /// 被换入的次数
    pub fn run_count(&self) -> u64 {
        self.inner().run_count
    }

    /// 抢占禁用计数
    pub fn preempt_count(&self) -> usize {
        self.task.preempt_count.load(Ordering::Relaxed)
    }

    /// 抢占禁用计数加一
    pub fn preempt_disable(&self) {
        self.task.preempt_count.fetch_add(1, Ordering::Relaxed);
    }

    /// 抢占禁用计数减一
    ///
    /// 计数已经为 0 时不做修改并记录错误。
    pub fn preempt_enable(&self) {
        let res = self.task.preempt_count.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |count| count.checked_sub(1),
        );
        if res.is_err() {
            log::error!("sched: preempt count underflow on task {}", self.id);
            debug_assert!(false, "preempt count underflow");
        }
    }

    /// 是否有待处理的信号
    pub fn signal_pending(&self) -> bool {
        self.task.signal_pending.load(Ordering::Acquire)
    }

    /// 标记待处理的信号
    pub fn raise_signal(&self) {
        self.task.signal_pending.store(true, Ordering::Release);
    }

    /// 清除待处理的信号，返回之前是否存在
    pub fn clear_signal(&self) -> bool {
        self.task.signal_pending.swap(false, Ordering::AcqRel)
    }

    /// 上下文的裸指针，供上下文切换使用
    pub(crate) fn context_ptr(&self) -> *mut TaskContext {
        let inner = self.task.inner.data_ptr();
        // SAFETY: 只取字段地址，不产生引用
        unsafe { &raw mut (*inner).context }
    }
}

/// 任务表
///
/// 槽位是定长数组，可以常量初始化为 `static`。分配与回收只在任务上下文中进行，
/// 由 [`InterruptibleSpinLock`] 串行化；查询只读原子量，任何上下文都可以调用。
pub struct TaskTable {
    slots: [Task; MAX_TASKS],
    /// 下一次分配开始搜索的位置
    alloc: InterruptibleSpinLock<usize>,
    live: AtomicUsize,
}

impl TaskTable {
    /// 创建空的任务表
    pub const fn new() -> Self {
        Self {
            slots: [const { Task::empty() }; MAX_TASKS],
            alloc: InterruptibleSpinLock::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// 创建一个内核任务，初始状态为 Ready，但尚未加入任何就绪队列
    pub fn create(
        &self,
        name: &'static str,
        entry: usize,
        arg: usize,
        stack_top: usize,
    ) -> Result<TaskId, SchedError> {
        let id = self.alloc_slot()?;
        let task = &self.slots[id.index()];
        let mut inner = task.inner.lock();
        *inner = TaskInner {
            name,
            state: TaskState::Ready,
            ..TaskInner::empty()
        };
        context_ops().init_kernel_context(&mut inner.context, entry, arg, stack_top);
        log::debug!("sched: created task {} ({})", id, name);
        Ok(id)
    }

    /// 创建 idle 任务
    ///
    /// idle 任务没有自己的初始上下文：第一次 `run_next` 时启动流程的上下文被保存进来，
    /// 启动流程就此成为 idle 任务。
    pub(crate) fn create_idle(&self, name: &'static str) -> Result<TaskId, SchedError> {
        let id = self.alloc_slot()?;
        *self.slots[id.index()].inner.lock() = TaskInner {
            name,
            state: TaskState::Running,
            idle: true,
            ..TaskInner::empty()
        };
        Ok(id)
    }

    fn alloc_slot(&self) -> Result<TaskId, SchedError> {
        let mut hint = self.alloc.lock();
        for offset in 0..MAX_TASKS {
            let index = (*hint + offset) % MAX_TASKS;
            let task = &self.slots[index];
            if task.occupied.load(Ordering::Acquire) {
                continue;
            }
            // 代数在回收时跳过 0
            let Some(generation) = NonZeroU32::new(task.generation.load(Ordering::Relaxed))
            else {
                continue;
            };
            task.preempt_count.store(0, Ordering::Relaxed);
            task.signal_pending.store(false, Ordering::Relaxed);
            task.occupied.store(true, Ordering::Release);
            *hint = (index + 1) % MAX_TASKS;
            self.live.fetch_add(1, Ordering::Relaxed);
            return Ok(TaskId::new(index as u32, generation));
        }
        Err(SchedError::NoFreeSlot)
    }

    /// 按句柄查找任务；句柄失效时返回 `None`
    pub fn get(&self, id: TaskId) -> Option<TaskRef<'_>> {
        let task = self.slots.get(id.index())?;
        if !task.occupied.load(Ordering::Acquire)
            || task.generation.load(Ordering::Acquire) != id.generation()
        {
            return None;
        }
        Some(TaskRef { id, task })
    }

    /// 回收一个已退出的任务，槽位可被重新分配
    ///
    /// 只有 Zombie 状态的任务可以回收；回收后所有旧句柄失效。
    pub fn release(&self, id: TaskId) -> Result<(), SchedError> {
        let _alloc = self.alloc.lock();
        let task = self.get(id).ok_or(SchedError::InvalidTask)?;
        let mut inner = task.inner();
        if inner.state != TaskState::Zombie || inner.on_rq {
            return Err(SchedError::InvalidState);
        }
        context_ops().destroy_context(&mut inner.context);
        *inner = TaskInner::empty();
        drop(inner);

        let slot = task.task;
        let next = match slot.generation.load(Ordering::Relaxed).wrapping_add(1) {
            0 => 1,
            generation => generation,
        };
        slot.generation.store(next, Ordering::Release);
        slot.occupied.store(false, Ordering::Release);
        self.live.fetch_sub(1, Ordering::Relaxed);
        log::debug!("sched: released task {}", id);
        Ok(())
    }

    /// 已分配的槽位数量（包括 idle 任务和尚未回收的 Zombie）
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
