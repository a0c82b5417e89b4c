// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话模块
//!
//! 会话是一个以 Cookie 标识、保存在服务端的键值存储。该模块包括：
//! - [`SessionStore`]：会话持久化的外部接口。
//! - [`FileSessionStore`]：以文件形式保存在会话目录中的实现。
//! - [`MemorySessionStore`]：进程内实现，供测试与嵌入式调用使用。
//! - [`Session`]：绑定到一次请求上的会话视图，每次修改都会同步写回存储（write-through）。
//!
//! ## 文件格式
//! 每条记录为 `key|type|value;`，`type` 取 `s`（字符串）、`n`（数字）、`b`（布尔）。
//! 例如：`fruit|s|apple;quantity|n|12.000000000000;organic|b|1;`

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt, fs, io,
    path::PathBuf,
    rc::Rc,
};

use log::{debug, error, warn};

use crate::{
    exception::Exception,
    param::*,
    response::Response,
    util::generate_session_id,
};

/// 会话中保存的值
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl SessionValue {
    /// 按字面量推断类型：`true`/`false` 为布尔，能解析为有限数字的为数字，其余为字符串。
    pub fn parse_literal(literal: &str) -> Self {
        match literal {
            "true" => SessionValue::Bool(true),
            "false" => SessionValue::Bool(false),
            _ => match literal.parse::<f64>() {
                Ok(n) if n.is_finite() => SessionValue::Number(n),
                _ => SessionValue::Str(literal.to_string()),
            },
        }
    }
}

impl From<&str> for SessionValue {
    fn from(s: &str) -> Self {
        SessionValue::Str(s.to_string())
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionValue::Str(s) => write!(f, "{}", s),
            SessionValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            SessionValue::Number(n) => write!(f, "{}", n),
            SessionValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// 一个会话的全部数据
pub type SessionData = BTreeMap<String, SessionValue>;

/// 会话持久化接口。
///
/// 所有调用都是同步阻塞的，没有超时。
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore {
    /// 开启（或恢复）会话并返回会话标识
    fn begin(&mut self) -> Result<String, Exception>;
    /// 读取会话当前保存的数据
    fn get_data(&mut self, id: &str) -> Result<SessionData, Exception>;
    /// 用给定数据整体覆盖会话
    fn set_data(&mut self, id: &str, data: &SessionData) -> Result<(), Exception>;
    fn status(&self, id: &str) -> SessionStatus;
    /// 丢弃会话，返回是否确实丢弃了一个会话
    fn destroy(&mut self, id: &str) -> Result<bool, Exception>;
}

/// 把会话数据编码为存储格式
pub fn encode_session(data: &SessionData) -> String {
    let mut out = String::new();
    for (key, value) in data {
        match value {
            SessionValue::Str(s) => out.push_str(&format!("{}|s|{};", key, s)),
            SessionValue::Number(n) => out.push_str(&format!(
                "{}|n|{:.*};",
                key, SESSION_NUMBER_PRECISION, n
            )),
            SessionValue::Bool(b) => out.push_str(&format!("{}|b|{};", key, *b as i32)),
        }
    }
    out
}

/// 解码存储格式。只有整个内容都能被完整解析时才返回 `Some`。
pub fn decode_session(contents: &str) -> Option<SessionData> {
    let mut data = SessionData::new();
    let mut rest = contents;
    while !rest.trim().is_empty() {
        let (key, r) = rest.split_once('|')?;
        let (kind, r) = r.split_once('|')?;
        let (value, r) = r.split_once(';')?;
        let value = match kind {
            "s" => SessionValue::Str(value.to_string()),
            "n" => SessionValue::Number(value.trim().parse::<f64>().ok()?),
            "b" => SessionValue::Bool(value.trim().parse::<i64>().map_or(false, |v| v != 0)),
            _ => return None,
        };
        data.insert(key.to_string(), value);
        rest = r;
    }
    Some(data)
}

/// 进程内会话存储。
///
/// 克隆出的实例共享同一份底层数据，因此可以用 [`MemorySessionStore::resuming`]
/// 模拟"下一次请求带着 Cookie 回来"的场景。
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Rc<RefCell<HashMap<String, SessionData>>>,
    counter: Rc<RefCell<u64>>,
    resume: Option<String>,
    active: Option<String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 共享底层数据的新句柄，`begin` 时会恢复给定的会话标识
    pub fn resuming(&self, id: &str) -> Self {
        Self {
            sessions: Rc::clone(&self.sessions),
            counter: Rc::clone(&self.counter),
            resume: Some(id.to_string()),
            active: None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.borrow().contains_key(id)
    }

    pub fn data(&self, id: &str) -> Option<SessionData> {
        self.sessions.borrow().get(id).cloned()
    }
}

impl SessionStore for MemorySessionStore {
    fn begin(&mut self) -> Result<String, Exception> {
        if let Some(id) = &self.active {
            return Ok(id.clone());
        }
        let id = match self.resume.take() {
            Some(id) => id,
            None => {
                let mut counter = self.counter.borrow_mut();
                *counter += 1;
                format!("sess{:016}", *counter)
            }
        };
        self.active = Some(id.clone());
        Ok(id)
    }

    fn get_data(&mut self, id: &str) -> Result<SessionData, Exception> {
        Ok(self.sessions.borrow().get(id).cloned().unwrap_or_default())
    }

    fn set_data(&mut self, id: &str, data: &SessionData) -> Result<(), Exception> {
        self.sessions
            .borrow_mut()
            .insert(id.to_string(), data.clone());
        Ok(())
    }

    fn status(&self, id: &str) -> SessionStatus {
        match &self.active {
            Some(active) if active == id => SessionStatus::Active,
            _ => SessionStatus::None,
        }
    }

    fn destroy(&mut self, id: &str) -> Result<bool, Exception> {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        Ok(self.sessions.borrow_mut().remove(id).is_some())
    }
}

/// 以文件形式保存会话的存储，每个会话对应会话目录下与标识同名的文件。
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    cookie: Option<String>,
    active: Option<String>,
    request_id: u128,
}

impl FileSessionStore {
    /// # 参数
    /// * `dir` - 会话文件所在目录。
    /// * `cookie` - 请求的 `HTTP_COOKIE`，用于恢复已有会话。
    /// * `request_id` - 请求 ID，用于日志追踪。
    pub fn new(dir: PathBuf, cookie: Option<String>, request_id: u128) -> Self {
        Self {
            dir,
            cookie,
            active: None,
            request_id,
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// 从 Cookie 中取出会话标识，长度不足的标识视为无效
    fn id_from_cookie(&self) -> Option<String> {
        let cookie = self.cookie.as_ref()?;
        let caps = SESSION_COOKIE_PATTERN.captures(cookie)?;
        let id = caps.get(1)?.as_str();
        if id.len() >= SESSION_ID_LENGTH {
            Some(id[..SESSION_ID_LENGTH].to_string())
        } else {
            warn!("[ID{}]Cookie中的会话标识长度不足：{}", self.request_id, id);
            None
        }
    }
}

impl SessionStore for FileSessionStore {
    fn begin(&mut self) -> Result<String, Exception> {
        if let Some(id) = &self.active {
            return Ok(id.clone());
        }
        let id = match self.id_from_cookie() {
            Some(id) => {
                debug!("[ID{}]从Cookie恢复会话：{}", self.request_id, id);
                id
            }
            None => {
                let id = generate_session_id();
                debug!("[ID{}]创建新会话：{}", self.request_id, id);
                id
            }
        };
        self.active = Some(id.clone());
        Ok(id)
    }

    fn get_data(&mut self, id: &str) -> Result<SessionData, Exception> {
        let path = self.path(id);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!(
                    "[ID{}]无法读取会话文件{}：{}",
                    self.request_id,
                    path.display(),
                    e
                );
                return Ok(SessionData::new());
            }
        };
        match decode_session(&contents) {
            Some(data) => Ok(data),
            None => {
                warn!(
                    "[ID{}]会话文件{}格式错误，按空会话处理",
                    self.request_id,
                    path.display()
                );
                Ok(SessionData::new())
            }
        }
    }

    fn set_data(&mut self, id: &str, data: &SessionData) -> Result<(), Exception> {
        let path = self.path(id);
        fs::write(&path, encode_session(data)).map_err(|e| {
            error!(
                "[ID{}]无法写入会话文件{}：{}",
                self.request_id,
                path.display(),
                e
            );
            Exception::SessionStorage(e.to_string())
        })?;
        debug!("[ID{}]会话文件已写入：{}", self.request_id, path.display());
        Ok(())
    }

    fn status(&self, id: &str) -> SessionStatus {
        match &self.active {
            Some(active) if active == id => SessionStatus::Active,
            _ => SessionStatus::None,
        }
    }

    fn destroy(&mut self, id: &str) -> Result<bool, Exception> {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        let path = self.path(id);
        debug!("[ID{}]删除会话文件：{}", self.request_id, path.display());
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(Exception::SessionStorage(e.to_string())),
        }
    }
}

/// 绑定到一次请求的会话视图。
///
/// 在 `start` 之前（以及 `destroy` 之后）它只是一个空的、不与任何存储关联的映射。
pub struct Session {
    store: Box<dyn SessionStore>,
    /// 当前绑定的会话标识
    id: Option<String>,
    /// 本次请求中最近一次开启过的会话标识，`destroy` 后仍保留以便查询状态
    last_id: Option<String>,
    data: SessionData,
    request_id: u128,
}

impl Session {
    pub fn new(store: Box<dyn SessionStore>, request_id: u128) -> Self {
        Self {
            store,
            id: None,
            last_id: None,
            data: SessionData::new(),
            request_id,
        }
    }

    /// 开启会话。已开启时什么也不做。
    ///
    /// 开启后会通过输出缓冲区追加 `Set-Cookie` 头，并把存储中的数据载入本地映射。
    pub fn start(&mut self, response: &mut Response) -> Result<(), Exception> {
        if self.id.is_some() {
            return Ok(());
        }
        let id = self.store.begin()?;
        response.append_header(&format!("Set-Cookie: {}={};", SESSION_COOKIE_NAME, id));
        self.data = self.store.get_data(&id)?;
        debug!(
            "[ID{}]会话{}已开启，载入{}个键",
            self.request_id,
            id,
            self.data.len()
        );
        self.last_id = Some(id.clone());
        self.id = Some(id);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.data.get(key)
    }

    /// 写入一个键，并在返回前把整个映射同步到存储
    pub fn set(&mut self, key: &str, value: SessionValue) -> Result<(), Exception> {
        self.data.insert(key.to_string(), value);
        self.mirror()
    }

    /// 删除一个键。键不存在时不做任何事，也不访问存储。
    pub fn delete(&mut self, key: &str) -> Result<(), Exception> {
        if self.data.remove(key).is_some() {
            self.mirror()?;
        }
        Ok(())
    }

    /// 清空映射、释放会话标识，并请求存储丢弃该会话
    pub fn destroy(&mut self) -> Result<bool, Exception> {
        self.data.clear();
        match self.id.take() {
            Some(id) => {
                debug!("[ID{}]销毁会话{}", self.request_id, id);
                self.store.destroy(&id)
            }
            None => Ok(false),
        }
    }

    pub fn id(&self) -> Result<&str, Exception> {
        self.id.as_deref().ok_or(Exception::SessionNotStarted)
    }

    pub fn status(&self) -> Result<SessionStatus, Exception> {
        let id = self.last_id.as_deref().ok_or(Exception::SessionNotStarted)?;
        Ok(self.store.status(id))
    }

    fn mirror(&mut self) -> Result<(), Exception> {
        match &self.id {
            Some(id) => self.store.set_data(id, &self.data),
            None => Ok(()),
        }
    }
}
