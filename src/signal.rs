//! 结构化提前退出。
//!
//! 脚本在任意嵌套深度调用 `exit` 时，都会构造一个 [`Interrupt::Exit`] 并沿着
//! `Result` 的 `Err` 路径一路向上传播，直到 [`crate::engine::Engine::run`]
//! 中唯一的顶层处理器。普通错误则以 [`Interrupt::Failure`] 的形式走同一条路径，
//! 处理器据此区分"正常写出缓冲区"与"输出诊断页面"。

use crate::exception::Exception;

/// 中断脚本执行的信号
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// 脚本主动请求退出，携带退出码
    Exit(i32),
    /// 其他任何未处理的失败
    Failure(Exception),
}

impl Interrupt {
    /// 以脚本给出的原始值构造退出信号，非数字的值按 0 处理。
    pub fn exit(code: Option<&str>) -> Self {
        Interrupt::Exit(exit_code(code))
    }
}

impl From<Exception> for Interrupt {
    fn from(e: Exception) -> Self {
        Interrupt::Failure(e)
    }
}

/// 把脚本传入的退出码转换为整数；缺失或不是数字时为 0。
pub fn exit_code(code: Option<&str>) -> i32 {
    code.and_then(|c| c.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .map_or(0, |n| n as i32)
}

/// 一次请求的最终结局。退出码只用于日志，不会影响 HTTP 状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 模板完整执行完毕
    Completed,
    /// 脚本调用了 `exit`
    Exited(i32),
    /// 发生未处理的失败，已输出诊断页面
    Failed,
}
