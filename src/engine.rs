//! 请求级顶层处理器。
//!
//! [`Engine::run`] 是唯一捕获 [`Interrupt`] 的地方，每个请求恰好产生以下三种输出之一：
//! 正常写出缓冲区、`exit` 后写出缓冲区、或者诊断页面。

use std::io::{self, Write};

use log::{error, info};

use crate::{
    context::ContextBuilder,
    evaluator::Evaluator,
    scanner,
    signal::{Interrupt, Outcome},
    util::HtmlBuilder,
};

/// 模板引擎
pub struct Engine<E: Evaluator> {
    evaluator: E,
}

impl<E: Evaluator> Engine<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// 处理一个请求：构建上下文、执行模板并把结果写入 `out`。
    ///
    /// 返回的 `io::Error` 只可能来自写出阶段；脚本层面的失败以 [`Outcome::Failed`] 表示。
    pub fn run<W: Write>(
        &mut self,
        template: &str,
        builder: ContextBuilder,
        out: &mut W,
    ) -> io::Result<Outcome> {
        let id = builder.request_id();
        let mut ctx = match builder.build() {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("[ID{}]请求数据无效：{}", id, e);
                emit_diagnostic(&e.to_string(), out)?;
                return Ok(Outcome::Failed);
            }
        };

        match scanner::execute(template, &mut self.evaluator, &mut ctx) {
            Ok(()) => {
                info!("[ID{}]模板执行完毕", id);
                ctx.into_response().flush(out)?;
                Ok(Outcome::Completed)
            }
            Err(Interrupt::Exit(code)) => {
                info!("[ID{}]脚本请求退出，退出码{}", id, code);
                ctx.into_response().flush(out)?;
                Ok(Outcome::Exited(code))
            }
            Err(Interrupt::Failure(e)) => {
                error!("[ID{}]脚本执行失败：{}", id, e);
                emit_diagnostic(&e.to_string(), out)?;
                Ok(Outcome::Failed)
            }
        }
    }
}

/// 直接向 `out` 写出诊断页面，不附带任何缓冲的响应头或响应体。
pub fn emit_diagnostic<W: Write>(description: &str, out: &mut W) -> io::Result<()> {
    out.write_all(HtmlBuilder::from_failure(description).build().as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::environment::MapEnvironment;
    use crate::exception::Exception;
    use crate::session::MemorySessionStore;

    fn builder() -> ContextBuilder {
        ContextBuilder::new(
            Box::new(MapEnvironment::new()),
            Box::new(MemorySessionStore::new()),
        )
    }

    fn run_with<E: Evaluator>(
        evaluator: E,
        template: &str,
        builder: ContextBuilder,
    ) -> (Outcome, String) {
        let mut engine = Engine::new(evaluator);
        let mut out = Vec::new();
        let outcome = engine.run(template, builder, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_completed_flushes_once() {
        let evaluator = |_: &str, ctx: &mut Context| -> Result<(), Interrupt> {
            ctx.echo("x");
            Ok(())
        };
        let (outcome, output) = run_with(evaluator, "a<??>b", builder());
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(output, "Content-type: text/html\r\n\r\naxb");
    }

    #[test]
    fn test_exit_flushes_buffer_and_skips_rest() {
        let evaluator = |code: &str, ctx: &mut Context| -> Result<(), Interrupt> {
            ctx.header("X-Step: 1");
            Err(Interrupt::exit(Some(code)))
        };
        let (outcome, output) = run_with(evaluator, "before<?5?>after", builder());
        assert_eq!(outcome, Outcome::Exited(5));
        assert_eq!(output, "Content-type: text/html\nX-Step: 1\r\n\r\nbefore");
    }

    #[test]
    fn test_failure_emits_diagnostic_only() {
        let evaluator = |_: &str, ctx: &mut Context| -> Result<(), Interrupt> {
            ctx.header("X-Hidden: yes");
            Err(Exception::ScriptError("first line\nsecond line".to_string()).into())
        };
        let (outcome, output) = run_with(evaluator, "buffered<??>", builder());
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(
            output,
            "<html><body>\nfirst line<br/>\nsecond line<br/>\n</body></html>\n"
        );
        assert!(!output.contains("buffered"));
        assert!(!output.contains("X-Hidden"));
    }

    #[test]
    fn test_malformed_query_is_diagnostic() {
        let mut calls = 0;
        let evaluator = |_: &str, _: &mut Context| -> Result<(), Interrupt> {
            calls += 1;
            Ok(())
        };
        let (outcome, output) = run_with(
            evaluator,
            "<??>",
            builder().query_string(Some("a=1&bad".to_string())),
        );
        assert_eq!(outcome, Outcome::Failed);
        assert!(output.contains("Invalid QUERY_STRING: malformed entry 'bad'<br/>"));
        assert_eq!(calls, 0);
    }
}
