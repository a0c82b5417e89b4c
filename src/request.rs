// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求数据处理模块
//!
//! 该模块负责把 CGI 宿主传入的原始请求数据整理为键值映射，供脚本片段只读访问：
//! 1. 查询字符串（`QUERY_STRING`）的解析，值保持原样不做解码。
//! 2. POST 正文的解析，`+` 还原为空格后再进行百分号解码。
//! 3. 按 `CONTENT_LENGTH` 从标准输入读取 POST 正文。
//!
//! 两个映射都在任何脚本片段执行之前一次性构建完成，此后不再改变。

use std::collections::HashMap;
use std::io::Read;

use log::{debug, error, warn};

use crate::{environment::Environment, exception::Exception};

/// 一次请求的查询参数与 POST 参数。
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// 查询参数：名称到原始值的映射
    query: HashMap<String, String>,
    /// POST 参数：名称到解码后值的映射
    post: HashMap<String, String>,
}

impl Request {
    /// 从原始查询字符串和 POST 正文构建 `Request` 实例。
    ///
    /// # 参数
    /// * `query_string` - `QUERY_STRING` 的内容，`None` 与空串都视为没有参数。
    /// * `post_body` - POST 正文，`None` 与空串都视为没有参数。
    /// * `id` - 请求 ID，用于日志追踪。
    ///
    /// # 错误处理
    /// 查询字符串中只要有一个条目格式错误，整个请求即失败，返回 `MalformedQueryString`。
    /// POST 正文中的格式错误只会被记录并跳过。
    pub fn try_from(
        query_string: Option<&str>,
        post_body: Option<&str>,
        id: u128,
    ) -> Result<Self, Exception> {
        let query = match query_string {
            Some(qs) => parse_query(qs).map_err(|e| {
                error!("[ID{}]无法解析查询字符串：{}", id, e);
                e
            })?,
            None => HashMap::new(),
        };

        let mut post = HashMap::new();
        if let Some(body) = post_body {
            for result in parse_post(body) {
                match result {
                    Ok((key, value)) => {
                        post.insert(key, value);
                    }
                    Err(e) => warn!("[ID{}]跳过POST条目：{}", id, e),
                }
            }
        }

        debug!(
            "[ID{}]请求数据解析完毕，查询参数{}个，POST参数{}个",
            id,
            query.len(),
            post.len()
        );
        Ok(Self { query, post })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取查询参数映射
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// 获取 POST 参数映射
    pub fn post(&self) -> &HashMap<String, String> {
        &self.post
    }
}

/// 解析查询字符串。
///
/// 每个 `&` 分隔的条目必须恰好包含一个 `=`，否则整个查询字符串无效。
pub fn parse_query(query_string: &str) -> Result<HashMap<String, String>, Exception> {
    let mut out = HashMap::new();
    if query_string.is_empty() {
        return Ok(out);
    }
    for entry in query_string.split('&') {
        let parts: Vec<&str> = entry.split('=').collect();
        if parts.len() != 2 {
            return Err(Exception::MalformedQueryString(entry.to_string()));
        }
        out.insert(parts[0].to_string(), parts[1].to_string());
    }
    Ok(out)
}

/// 解析 POST 正文，逐条返回结果。
///
/// 格式错误的条目以 `MalformedPostEntry` 的形式返回，由调用方决定如何报告。
pub fn parse_post(body: &str) -> Vec<Result<(String, String), Exception>> {
    if body.is_empty() {
        return Vec::new();
    }
    body.split('&')
        .map(|entry| {
            let parts: Vec<&str> = entry.split('=').collect();
            if parts.len() != 2 {
                return Err(Exception::MalformedPostEntry(entry.to_string()));
            }
            let value = parts[1].replace('+', " ");
            match urlencoding::decode(&value) {
                Ok(decoded) => Ok((parts[0].to_string(), decoded.into_owned())),
                Err(_) => Err(Exception::MalformedPostEntry(entry.to_string())),
            }
        })
        .collect()
}

/// 按 CGI 约定从输入中读取 POST 正文。
///
/// 正文长度由 `CONTENT_LENGTH` 决定，缺失、非法或为 0 时不读取输入。
pub fn read_post_body<R: Read>(env: &dyn Environment, input: &mut R, id: u128) -> Option<String> {
    let content_length = env.getenv("CONTENT_LENGTH")?;
    let length = match content_length.trim().parse::<u64>() {
        Ok(0) => return None,
        Ok(n) => n,
        Err(_) => {
            warn!("[ID{}]非法的CONTENT_LENGTH：{}", id, content_length);
            return None;
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = input.take(length).read_to_end(&mut buffer) {
        error!("[ID{}]读取POST正文失败：{}", id, e);
        return None;
    }
    if (buffer.len() as u64) < length {
        warn!(
            "[ID{}]POST正文比CONTENT_LENGTH短：期望{}字节，实际{}字节",
            id,
            length,
            buffer.len()
        );
    }
    Some(String::from_utf8_lossy(&buffer).into_owned())
}
