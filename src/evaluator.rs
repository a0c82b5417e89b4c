//! # 脚本求值器
//!
//! [`Evaluator`] 是引擎与脚本语言之间唯一的接缝：引擎只负责切分模板、维护上下文，
//! 片段的含义完全由求值器决定。任何 `FnMut(&str, &mut Context)` 闭包都可以充当求值器。
//!
//! [`DirectiveEvaluator`] 是内置的极简指令语言，使二进制程序不依赖外部解释器即可运行：
//!
//! ```text
//! <? session_start
//!    set greeting "Hello, " @get.name
//!    echo $greeting "<br/>"
//!    session_set visits @session.visits ?>
//! ```
//!
//! - 语句以换行或 `;` 结束，`#` 开始一行注释。
//! - 命令：`echo`、`header`、`exit [code]`、`set name expr…`、`session_start`、
//!   `session_set key expr…`、`session_delete key`、`session_destroy`、`include expr…`、`fail expr…`。
//! - 表达式：双引号字符串（支持 `\n \t \" \\` 转义）、裸词、`$var`、`@get.k`、`@post.k`、
//!   `@server.NAME`、`@session.k`、`@session_id`、`@session_status`。
//! - 一个命令的多个表达式以单个空格连接。

use log::debug;

use crate::{
    context::Context,
    exception::Exception,
    scanner,
    session::SessionValue,
    signal::Interrupt,
};

/// 执行单个脚本片段。
///
/// 片段之间共享同一个 [`Context`]；返回 `Err(Interrupt::Exit)` 表示脚本请求提前退出。
pub trait Evaluator {
    fn execute(&mut self, fragment: &str, ctx: &mut Context) -> Result<(), Interrupt>;
}

impl<F> Evaluator for F
where
    F: FnMut(&str, &mut Context) -> Result<(), Interrupt>,
{
    fn execute(&mut self, fragment: &str, ctx: &mut Context) -> Result<(), Interrupt> {
        self(fragment, ctx)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// 未加引号的词，可能是引用（`$`、`@`）
    Word(String),
    /// 双引号字符串，已处理转义
    Quoted(String),
    /// 语句结束
    End,
}

fn script_error(message: String) -> Interrupt {
    Interrupt::Failure(Exception::ScriptError(message))
}

fn tokenize(source: &str) -> Result<Vec<Token>, Interrupt> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | ';' => tokens.push(Token::End),
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                let mut text = String::new();
                let mut closed = false;
                while let Some(next) = chars.next() {
                    match next {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some(other) => {
                                text.push('\\');
                                text.push(other);
                            }
                            None => text.push('\\'),
                        },
                        _ => text.push(next),
                    }
                }
                if !closed {
                    return Err(script_error("unterminated string literal".to_string()));
                }
                tokens.push(Token::Quoted(text));
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut word = c.to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == ';' || next == '"' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

/// 内置的指令语言求值器
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectiveEvaluator;

impl DirectiveEvaluator {
    pub fn new() -> Self {
        DirectiveEvaluator
    }

    fn run_statement(&mut self, tokens: &[Token], ctx: &mut Context) -> Result<(), Interrupt> {
        let (command, args) = match tokens.split_first() {
            Some((Token::Word(command), args)) => (command.as_str(), args),
            Some((other, _)) => {
                return Err(script_error(format!("expected a command, found {:?}", other)))
            }
            None => return Ok(()),
        };
        debug!("[ID{}]执行指令{}", ctx.id(), command);

        match command {
            "echo" => {
                let text = join(args, ctx)?;
                ctx.echo(&text);
            }
            "header" => {
                if args.is_empty() {
                    return Err(script_error("header requires a value".to_string()));
                }
                let line = join(args, ctx)?;
                ctx.header(&line);
            }
            "exit" => {
                let code = match args.first() {
                    Some(token) => Some(evaluate(token, ctx)?),
                    None => None,
                };
                return Err(Interrupt::exit(code.as_deref()));
            }
            "set" => {
                let (name, rest) = match args.split_first() {
                    Some((Token::Word(name), rest)) if !name.starts_with(['$', '@']) => {
                        (name, rest)
                    }
                    _ => return Err(script_error("set requires a variable name".to_string())),
                };
                let value = join(rest, ctx)?;
                ctx.set_var(name, value);
            }
            "session_start" => ctx.session_start()?,
            "session_set" => {
                let (key, rest) = match args.split_first() {
                    Some((key, rest)) => (evaluate(key, ctx)?, rest),
                    None => return Err(script_error("session_set requires a key".to_string())),
                };
                let text = join(rest, ctx)?;
                let value = if rest.iter().any(|t| matches!(t, Token::Quoted(_))) {
                    SessionValue::Str(text)
                } else {
                    SessionValue::parse_literal(&text)
                };
                ctx.session_set(&key, value)?;
            }
            "session_delete" => {
                let key = match args.first() {
                    Some(key) => evaluate(key, ctx)?,
                    None => {
                        return Err(script_error("session_delete requires a key".to_string()))
                    }
                };
                ctx.session_delete(&key)?;
            }
            "session_destroy" => {
                ctx.session_destroy()?;
            }
            "include" => {
                let path = join(args, ctx)?;
                scanner::include(self, ctx, &path)?;
            }
            "fail" => {
                let message = join(args, ctx)?;
                return Err(script_error(message));
            }
            _ => return Err(script_error(format!("unknown command '{}'", command))),
        }
        Ok(())
    }
}

impl Evaluator for DirectiveEvaluator {
    fn execute(&mut self, fragment: &str, ctx: &mut Context) -> Result<(), Interrupt> {
        let tokens = tokenize(fragment)?;
        for statement in tokens.split(|t| *t == Token::End) {
            self.run_statement(statement, ctx)?;
        }
        Ok(())
    }
}

/// 求出一个表达式的字符串值
fn evaluate(token: &Token, ctx: &Context) -> Result<String, Interrupt> {
    let word = match token {
        Token::Quoted(text) => return Ok(text.clone()),
        Token::Word(word) => word,
        Token::End => return Ok(String::new()),
    };

    if let Some(name) = word.strip_prefix('$') {
        return ctx
            .var(name)
            .map(str::to_string)
            .ok_or_else(|| script_error(format!("undefined variable ${}", name)));
    }

    let reference = match word.strip_prefix('@') {
        Some(reference) => reference,
        None => return Ok(word.clone()),
    };
    match reference {
        "session_id" => Ok(ctx.session_id()?.to_string()),
        "session_status" => Ok(ctx.session_status()?.to_string()),
        _ => match reference.split_once('.') {
            Some(("get", key)) => Ok(ctx.query().get(key).cloned().unwrap_or_default()),
            Some(("post", key)) => Ok(ctx.post().get(key).cloned().unwrap_or_default()),
            Some(("server", name)) => Ok(ctx.server_var(name).unwrap_or_default()),
            Some(("session", key)) => Ok(ctx
                .session_get(key)
                .map(|v| v.to_string())
                .unwrap_or_default()),
            _ => Err(script_error(format!("unknown reference @{}", reference))),
        },
    }
}

fn join(tokens: &[Token], ctx: &Context) -> Result<String, Interrupt> {
    let values = tokens
        .iter()
        .map(|t| evaluate(t, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values.join(" "))
}
