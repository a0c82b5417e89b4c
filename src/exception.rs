// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了模板引擎在一次请求的生命周期中可能产生的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了请求数据解析错误、会话存储错误、include 错误以及脚本执行错误。
//! - **统一出口**：除 `MalformedPostEntry` 只记录日志外，其余异常都会一路传播到
//!   顶层处理器，最终以诊断页面的形式呈现给客户端。
//! - **用户友好**：通过实现 `std::fmt::Display`，确保错误信息可以直接写入日志或诊断页面。

use std::fmt;

/// 模板引擎处理请求过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 查询字符串中存在不能恰好按一个 `=` 切分的条目。
    /// 这是致命错误：任何脚本片段都不会被执行。
    MalformedQueryString(String),
    /// POST 数据中存在格式错误的条目。非致命，该条目会被跳过。
    MalformedPostEntry(String),
    /// 在调用 `session_start` 之前访问了需要会话的操作。
    SessionNotStarted,
    /// 会话存储读写失败，携带底层错误描述。
    SessionStorage(String),
    /// include 的文件无法读取，或超过了单次请求允许的 include 数量。
    IncludeFailed(String),
    /// 请求的路径格式非法或包含越权尝试（如 `..` 目录遍历）。
    InvalidPath(String),
    /// 找不到要执行的模板文件。
    TemplateNotFound(String),
    /// 脚本片段内部运行错误。
    ScriptError(String),
}

use Exception::*;

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
///
/// 这些描述信息既用于系统日志，也会原样出现在诊断页面中。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedQueryString(entry) => {
                write!(f, "Invalid QUERY_STRING: malformed entry '{}'", entry)
            }
            MalformedPostEntry(entry) => write!(f, "Unexpected post data: '{}'", entry),
            SessionNotStarted => write!(f, "Session has not been started"),
            SessionStorage(e) => write!(f, "Session storage error: {}", e),
            IncludeFailed(path) => write!(f, "Couldn't include '{}'", path),
            InvalidPath(path) => write!(f, "Invalid path '{}'", path),
            TemplateNotFound(path) => write!(f, "Template not found: {}", path),
            ScriptError(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            MalformedQueryString("bad".to_string()).to_string(),
            "Invalid QUERY_STRING: malformed entry 'bad'"
        );
        assert_eq!(SessionNotStarted.to_string(), "Session has not been started");
        assert_eq!(
            ScriptError("ReferenceError: x".to_string()).to_string(),
            "ReferenceError: x"
        );
    }

    #[test]
    fn test_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(InvalidPath("../etc".to_string()));
        assert!(e.to_string().contains("../etc"));
    }
}
