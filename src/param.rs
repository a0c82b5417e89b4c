// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板引擎协议参数与常量模块
//!
//! 该模块定义了 `webscript` 遵循的 CGI 输出协议相关常量和数据结构，包括：
//! - 模板标签的开闭标记。
//! - 默认响应头与重定向前导头。
//! - 会话 Cookie 的命名与格式约束。
//! - 会话状态的强类型枚举。

use lazy_static::lazy_static;
use regex::Regex;

/// 脚本片段的开始标记
pub const OPEN_TAG: &str = "<?";

/// 脚本片段的结束标记
pub const CLOSE_TAG: &str = "?>";

/// 每个请求初始化时携带的默认响应头
pub const DEFAULT_CONTENT_TYPE: &str = "Content-type: text/html";

/// 触发重定向的响应头前缀，比较时不区分大小写
pub const LOCATION_PREFIX: &str = "location:";

/// 设置 `Location` 头时强制使用的状态行
pub const REDIRECT_STATUS_LINE: &str = "HTTP/1.0 302 Ok\r\n";

/// 设置 `Location` 头时强制使用的 CGI `Status` 头
pub const REDIRECT_STATUS_HEADER: &str = "Status: 302 Moved\r\n";

/// 响应头与响应体之间的空行分隔符
pub const HEADER_SEPARATOR: &str = "\r\n\r\n";

/// 携带会话标识的 Cookie 名称
pub const SESSION_COOKIE_NAME: &str = "DUKSID";

/// 会话标识的固定长度
pub const SESSION_ID_LENGTH: usize = 20;

/// 数字类型会话值写入存储时保留的小数位数
pub const SESSION_NUMBER_PRECISION: usize = 12;

/// 单次请求默认允许 include 的最大文件数
pub const MAX_INCLUDES: usize = 16;

lazy_static! {
    /// 从 `HTTP_COOKIE` 中提取会话标识的正则。
    ///
    /// 只接受 ASCII 字母数字，防止通过 Cookie 构造出越权的会话文件路径。
    pub static ref SESSION_COOKIE_PATTERN: Regex =
        Regex::new(&format!(r"{}=([A-Za-z0-9]+)", SESSION_COOKIE_NAME))
            .expect("session cookie pattern is a valid regex");
}

/// 会话在存储端的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// 当前没有处于活动状态的会话
    None,
    /// 会话已开启
    Active,
}

use std::fmt;

impl fmt::Display for SessionStatus {
    /// 将枚举格式化为脚本可见的状态字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SessionStatus::None => write!(f, "none"),
            SessionStatus::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_pattern_extracts_id() {
        let cookie = "theme=dark; DUKSID=sess0000012345123456; lang=en";
        let caps = SESSION_COOKIE_PATTERN.captures(cookie).unwrap();
        assert_eq!(&caps[1], "sess0000012345123456");
    }

    #[test]
    fn test_cookie_pattern_rejects_path_characters() {
        let caps = SESSION_COOKIE_PATTERN.captures("DUKSID=../../etc/passwd");
        assert!(caps.is_none());
    }

    #[test]
    fn test_session_status_display() {
        assert_eq!(SessionStatus::None.to_string(), "none");
        assert_eq!(SessionStatus::Active.to_string(), "active");
    }
}
