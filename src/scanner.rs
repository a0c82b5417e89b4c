//! 模板标签扫描与执行。
//!
//! 模板由普通文本和 `<?` ... `?>` 包围的脚本片段交替组成。
//! [`Scanner`] 只负责切分，[`execute`] 按原始顺序把文本写入响应体、把片段交给求值器。

use log::debug;

use crate::{
    context::Context,
    evaluator::Evaluator,
    param::{CLOSE_TAG, OPEN_TAG},
    signal::Interrupt,
};

/// 模板中的一段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// 原样输出的文本
    Literal(&'a str),
    /// 交给求值器执行的脚本片段（不含标记本身）
    Fragment(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ScanningLiteral,
    ScanningFragment,
    Done,
}

/// 把模板切分为 [`Segment`] 序列的迭代器。
///
/// 找不到结束标记时，开始标记之后的全部内容就是最后一个片段，其后不再有文本。
/// 空文本段会被跳过，空片段（如 `<??>`）则照常产出。
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    template: &'a str,
    cursor: usize,
    state: State,
}

impl<'a> Scanner<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            cursor: 0,
            state: State::ScanningLiteral,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = &self.template[self.cursor..];
            match self.state {
                State::Done => return None,
                State::ScanningLiteral => match rest.find(OPEN_TAG) {
                    Some(pos) => {
                        self.cursor += pos + OPEN_TAG.len();
                        self.state = State::ScanningFragment;
                        if pos > 0 {
                            return Some(Segment::Literal(&rest[..pos]));
                        }
                    }
                    None => {
                        self.cursor = self.template.len();
                        self.state = State::Done;
                        if !rest.is_empty() {
                            return Some(Segment::Literal(rest));
                        }
                    }
                },
                State::ScanningFragment => match rest.find(CLOSE_TAG) {
                    Some(pos) => {
                        self.cursor += pos + CLOSE_TAG.len();
                        self.state = State::ScanningLiteral;
                        return Some(Segment::Fragment(&rest[..pos]));
                    }
                    None => {
                        self.cursor = self.template.len();
                        self.state = State::Done;
                        return Some(Segment::Fragment(rest));
                    }
                },
            }
        }
    }
}

/// 扫描并执行整个模板。
///
/// 文本段追加到响应体，片段交给 `evaluator`；任何 `Err` 都会立即终止扫描并向上传播。
pub fn execute<E: Evaluator + ?Sized>(
    template: &str,
    evaluator: &mut E,
    ctx: &mut Context,
) -> Result<(), Interrupt> {
    for (index, segment) in Scanner::new(template).enumerate() {
        match segment {
            Segment::Literal(text) => ctx.echo(text),
            Segment::Fragment(code) => {
                debug!("[ID{}]执行第{}段的脚本片段", ctx.id(), index);
                evaluator.execute(code, ctx)?;
            }
        }
    }
    Ok(())
}

/// 执行一个 include 文件。
///
/// 模板扩展名的文件会经过标签扫描，其他文件整体作为一个片段执行；
/// 已经 include 过的文件什么也不做。
pub fn include<E: Evaluator + ?Sized>(
    evaluator: &mut E,
    ctx: &mut Context,
    path: &str,
) -> Result<(), Interrupt> {
    let source = match ctx.load_include(path)? {
        Some(source) => source,
        None => return Ok(()),
    };
    if source.is_template {
        execute(&source.text, evaluator, ctx)
    } else {
        evaluator.execute(&source.text, ctx)
    }
}
