//! 测试支持 crate
//!
//! 提供 Mock 实现和测试工具
//!
//! 所有 Mock 的可变状态都是线程本地的：libtest 的每个测试线程相当于一颗独立的模拟 CPU，
//! 并行运行的测试互不干扰。线程可能被复用，所以测试开头应调用各 Mock 的 `reset()`。

#![no_std]

extern crate alloc;
extern crate std;

pub mod mock;
