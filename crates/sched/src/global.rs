//! 全局调度状态
//!
//! 任务表和中断分发表是常量初始化的 `static`；每个 CPU 的调度器和回收者
//! 需要分配内存，由 [`init`] 在开中断之前创建一次。

use alloc::boxed::Box;

use once_cell::race::OnceBox;
use sync::{IntrGuard, TaskHandle, TaskOps};

use crate::config::{MAX_CPUS, MAX_TASKS};
use crate::{
    IrqTable, PerCpu, Reaper, SchedError, Scheduler, TaskContext, TaskId, TaskRef, TaskTable,
    context_ops,
};

static TASK_TABLE: TaskTable = TaskTable::new();
static IRQ_TABLE: IrqTable = IrqTable::new();
static GLOBAL: OnceBox<GlobalState> = OnceBox::new();
static SCHED_TASK_OPS: SchedTaskOps = SchedTaskOps;

struct GlobalState {
    schedulers: PerCpu<Scheduler>,
    reaper: Reaper,
}

/// 让 sync 中的锁能找到当前任务及其抢占计数
struct SchedTaskOps;

impl SchedTaskOps {
    fn lookup(task: TaskHandle) -> Option<TaskRef<'static>> {
        let found = TaskId::from_handle(task).and_then(|id| TASK_TABLE.get(id));
        if found.is_none() {
            log::error!("sched: stale task handle {:#x}", task.as_raw());
        }
        found
    }
}

impl TaskOps for SchedTaskOps {
    fn current_task(&self) -> Option<TaskHandle> {
        current_task().map(TaskId::into_handle)
    }

    fn preempt_disable(&self, task: TaskHandle) {
        if let Some(task) = Self::lookup(task) {
            task.preempt_disable();
        }
    }

    fn preempt_enable(&self, task: TaskHandle) {
        if let Some(task) = Self::lookup(task) {
            task.preempt_enable();
        }
    }

    fn preempt_count(&self, task: TaskHandle) -> usize {
        Self::lookup(task).map_or(0, |task| task.preempt_count())
    }
}

/// 初始化调度器
///
/// 为每个 CPU 创建调度器（及其 idle 任务），然后向 sync 注册 [`TaskOps`]。
/// 必须在单线程环境下、开中断之前调用，且 [`ContextOps`](crate::ContextOps)
/// 与 `sync::ArchOps` 都已注册。
pub fn init() -> Result<(), SchedError> {
    if GLOBAL.get().is_some() {
        return Err(SchedError::AlreadyInitialized);
    }
    let schedulers = PerCpu::try_new(|cpu| Scheduler::new(cpu, &TASK_TABLE))?;
    let reaper = Reaper::new()?;
    GLOBAL
        .set(Box::new(GlobalState { schedulers, reaper }))
        .map_err(|_| SchedError::AlreadyInitialized)?;
    // SAFETY: init 只在启动阶段单线程调用，GLOBAL 保证只会走到这里一次
    unsafe { sync::register_task_ops(&SCHED_TASK_OPS) };
    log::info!(
        "sched: initialized with {} cpu(s), {} task slots",
        MAX_CPUS,
        MAX_TASKS
    );
    Ok(())
}

fn global() -> &'static GlobalState {
    match GLOBAL.get() {
        Some(state) => state,
        None => panic!("sched: not initialized, call sched::init first"),
    }
}

/// 全局任务表
pub fn task_table() -> &'static TaskTable {
    &TASK_TABLE
}

/// 全局中断分发表
pub fn irq_table() -> &'static IrqTable {
    &IRQ_TABLE
}

/// 当前 CPU 的调度器；尚未初始化时返回 `None`
pub fn try_current_scheduler() -> Option<&'static Scheduler> {
    GLOBAL.get().map(|state| state.schedulers.get())
}

/// 当前 CPU 的调度器
///
/// # Panics
/// 如果尚未调用 [`init`]，则 panic
pub fn current_scheduler() -> &'static Scheduler {
    global().schedulers.get()
}

/// 指定 CPU 的调度器
pub fn scheduler_of(cpu: usize) -> Option<&'static Scheduler> {
    GLOBAL.get()?.schedulers.get_of(cpu)
}

/// 当前任务；启动早期返回 `None`
pub fn current_task() -> Option<TaskId> {
    try_current_scheduler()?.current_task_null_if_during_boot()
}

/// 创建内核任务并加入当前 CPU 的就绪队列
pub fn spawn(
    name: &'static str,
    entry: usize,
    arg: usize,
    stack_top: usize,
) -> Result<TaskId, SchedError> {
    let sched = try_current_scheduler().ok_or(SchedError::NotInitialized)?;
    let id = TASK_TABLE.create(name, entry, arg, stack_top)?;
    sched.add_task(id)?;
    Ok(id)
}

/// 让出 CPU
pub fn yield_now() {
    if let Some(sched) = try_current_scheduler() {
        sched.yield_now();
    }
}

/// 向任务发送信号，打断它正在进行的等待
pub fn send_signal(id: TaskId) -> Result<(), SchedError> {
    try_current_scheduler()
        .ok_or(SchedError::NotInitialized)?
        .signal(id)
}

/// 结束当前任务：标记为 Zombie、交给回收者、切换出去
///
/// 任务被回收后不会再被换入，因此在真实硬件上不会返回。
/// 从标记 Zombie 到切换出去的整个过程都关着中断。
pub fn exit_current() -> Result<TaskId, SchedError> {
    let state = GLOBAL.get().ok_or(SchedError::NotInitialized)?;
    let _guard = IntrGuard::new();
    let sched = state.schedulers.get();
    let id = sched.exit_current()?;
    state.reaper.enqueue(id, sched);
    sched.run_next();
    Ok(id)
}

/// 任务的退出路径
pub fn exit_task() -> ! {
    if let Err(e) = exit_current() {
        log::error!("sched: exit failed: {}", e);
    }
    loop {
        context_ops().wait_for_interrupt();
    }
}

/// 立即回收所有已登记的 Zombie，返回回收数量
pub fn reap_zombies() -> Result<usize, SchedError> {
    let state = GLOBAL.get().ok_or(SchedError::NotInitialized)?;
    Ok(state.reaper.reap_pending(&TASK_TABLE))
}

/// 回收者任务的入口
pub extern "C" fn reaper_main(_arg: usize) -> ! {
    let state = global();
    loop {
        let sched = state.schedulers.get();
        match state.reaper.run_once(sched) {
            Ok(_) => {}
            Err(SchedError::Interrupted) => {
                // 回收者不处理信号
                if let Some(task) = sched
                    .current_task_null_if_during_boot()
                    .and_then(|id| TASK_TABLE.get(id))
                {
                    task.clear_signal();
                }
            }
            Err(e) => log::error!("reaper: {}", e),
        }
    }
}

/// 创建回收者任务
///
/// `stack_top` 由内存子系统分配。
pub fn spawn_reaper(stack_top: usize) -> Result<TaskId, SchedError> {
    spawn("reaper", reaper_main as usize, 0, stack_top)
}

/// 中断入口：把中断分发给当前 CPU
///
/// `frame` 是陷入帧，返回后中断返回路径应从 `frame` 恢复执行。
pub fn handle_irq(irq: usize, frame: &mut TaskContext) {
    match try_current_scheduler() {
        Some(sched) => IRQ_TABLE.dispatch(irq, sched, frame),
        None => log::warn!("irq: irq {} before scheduler init", irq),
    }
}

/// idle 任务的主循环
///
/// 启动流程完成初始化后调用，自身成为当前 CPU 的 idle 任务。
pub fn idle_loop() -> ! {
    let sched = current_scheduler();
    loop {
        idle_once(sched);
    }
}

/// idle 循环的一轮：有就绪任务就切换过去，否则等待中断
///
/// 检查就绪队列与等待中断之间关着中断，唤醒任务的中断会挂起而不会丢失，
/// 它使 `wait_for_interrupt` 立即返回，开中断后再得到处理。
pub(crate) fn idle_once(sched: &Scheduler) {
    sched.run_next();
    let _guard = IntrGuard::new();
    if sched.ready_len() == 0 {
        context_ops().wait_for_interrupt();
    }
}
