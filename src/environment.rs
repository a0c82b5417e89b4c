//! CGI 环境变量访问。
//!
//! 宿主通过环境变量把请求元数据（`QUERY_STRING`、`HTTP_COOKIE` 等）传给引擎。
//! 引擎只通过 [`Environment`] 读取它们，测试时可以换成 [`MapEnvironment`]。

use std::collections::HashMap;

/// 环境变量查询接口。
///
/// 不存在的变量必须返回 `None` 而不是空字符串，
/// 这样脚本端的"是否设置"判断才能得到正确结果。
pub trait Environment {
    fn getenv(&self, name: &str) -> Option<String>;
}

/// 读取当前进程真实环境变量的实现
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn getenv(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// 基于内存映射的实现，用于测试和嵌入式调用
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl Environment for MapEnvironment {
    fn getenv(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_environment_absent_is_none() {
        let env = MapEnvironment::new().with("REQUEST_METHOD", "GET");
        assert_eq!(env.getenv("REQUEST_METHOD"), Some("GET".to_string()));
        assert_eq!(env.getenv("HTTP_COOKIE"), None);
    }

    #[test]
    fn test_map_environment_empty_value_is_present() {
        let env = MapEnvironment::new().with("QUERY_STRING", "");
        assert_eq!(env.getenv("QUERY_STRING"), Some(String::new()));
    }
}
