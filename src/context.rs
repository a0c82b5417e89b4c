//! 一次请求的共享执行上下文。
//!
//! 同一模板中的所有脚本片段都通过 `&mut Context` 访问同一个上下文：
//! 前面的片段定义的变量、写入的响应头和会话修改，后面的片段都能看到。
//! 上下文的生命周期恰好是一次请求。

use std::{
    collections::HashMap,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use log::{debug, error, warn};

use crate::{
    config::{default_template_extensions, Config},
    environment::Environment,
    exception::Exception,
    param::{SessionStatus, MAX_INCLUDES},
    request::{read_post_body, Request},
    response::Response,
    session::{Session, SessionStore, SessionValue},
    util::is_safe_relative,
};

/// 已加载的 include 文件
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeSource {
    pub path: PathBuf,
    pub text: String,
    /// 是否按模板处理（否则整个文件作为一个脚本片段执行）
    pub is_template: bool,
}

/// 解析 include 路径并保证每个文件只被包含一次
#[derive(Debug, Clone)]
struct IncludeResolver {
    root: PathBuf,
    max: usize,
    template_extensions: Vec<String>,
    loaded: Vec<PathBuf>,
}

impl IncludeResolver {
    fn load(&mut self, path: &str, id: u128) -> Result<Option<IncludeSource>, Exception> {
        let relative = Path::new(path);
        if !is_safe_relative(relative) {
            error!("[ID{}]include路径{}包含非法成分", id, path);
            return Err(Exception::InvalidPath(path.to_string()));
        }
        let full_path = self.root.join(relative);
        if self.loaded.contains(&canonical(&full_path)) {
            debug!("[ID{}]{}已被include过，跳过", id, full_path.display());
            return Ok(None);
        }
        if self.loaded.len() >= self.max {
            error!("[ID{}]include数量已达上限{}", id, self.max);
            return Err(Exception::IncludeFailed(path.to_string()));
        }
        let text = match fs::read(&full_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                error!("[ID{}]无法读取include文件{}：{}", id, full_path.display(), e);
                return Err(Exception::IncludeFailed(path.to_string()));
            }
        };
        let is_template = full_path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| self.template_extensions.iter().any(|t| t == e));
        debug!(
            "[ID{}]include文件{}，按{}处理",
            id,
            full_path.display(),
            if is_template { "模板" } else { "脚本" }
        );
        self.loaded.push(canonical(&full_path));
        Ok(Some(IncludeSource {
            path: full_path,
            text,
            is_template,
        }))
    }
}

/// 用于判断是否为同一文件的路径；文件不存在时退回原路径
fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// 构建 [`Context`] 所需的原始材料。
///
/// 请求数据的解析发生在 [`ContextBuilder::build`] 中，也就是在顶层处理器的保护之内，
/// 因此查询字符串格式错误同样会以诊断页面的形式呈现。
pub struct ContextBuilder {
    id: u128,
    query_string: Option<String>,
    post_body: Option<String>,
    environment: Box<dyn Environment>,
    store: Box<dyn SessionStore>,
    document_root: PathBuf,
    template_path: Option<PathBuf>,
    max_includes: usize,
    template_extensions: Vec<String>,
}

impl ContextBuilder {
    pub fn new(environment: Box<dyn Environment>, store: Box<dyn SessionStore>) -> Self {
        Self {
            id: 0,
            query_string: None,
            post_body: None,
            environment,
            store,
            document_root: PathBuf::from("."),
            template_path: None,
            max_includes: MAX_INCLUDES,
            template_extensions: default_template_extensions(),
        }
    }

    /// 按 CGI 约定准备请求数据：查询字符串取自 `QUERY_STRING`，
    /// POST 正文按 `CONTENT_LENGTH` 从 `input` 读取。
    pub fn from_cgi<R: Read>(
        environment: Box<dyn Environment>,
        store: Box<dyn SessionStore>,
        input: &mut R,
        id: u128,
    ) -> Self {
        let query_string = environment.getenv("QUERY_STRING");
        let post_body = read_post_body(environment.as_ref(), input, id);
        Self::new(environment, store)
            .id(id)
            .query_string(query_string)
            .post_body(post_body)
    }

    pub fn id(mut self, id: u128) -> Self {
        self.id = id;
        self
    }

    pub fn query_string(mut self, query_string: Option<String>) -> Self {
        self.query_string = query_string;
        self
    }

    pub fn post_body(mut self, post_body: Option<String>) -> Self {
        self.post_body = post_body;
        self
    }

    pub fn document_root(mut self, root: PathBuf) -> Self {
        self.document_root = root;
        self
    }

    /// 正在执行的主模板。它与 include 的文件一起登记，
    /// 因此 include 主模板本身不会再执行一遍，也计入 include 数量上限。
    pub fn template_path(mut self, path: PathBuf) -> Self {
        self.template_path = Some(path);
        self
    }

    /// 应用配置文件中与执行相关的设置
    pub fn config(mut self, config: &Config) -> Self {
        self.max_includes = config.max_includes();
        self.template_extensions = config.template_extensions().to_vec();
        if let Some(root) = config.document_root() {
            self.document_root = root;
        }
        self
    }

    pub fn request_id(&self) -> u128 {
        self.id
    }

    pub fn build(self) -> Result<Context, Exception> {
        let request = Request::try_from(
            self.query_string.as_deref(),
            self.post_body.as_deref(),
            self.id,
        )?;
        let loaded = self
            .template_path
            .as_deref()
            .map(canonical)
            .into_iter()
            .collect();
        Ok(Context {
            id: self.id,
            request,
            response: Response::new(),
            session: Session::new(self.store, self.id),
            environment: self.environment,
            variables: HashMap::new(),
            includes: IncludeResolver {
                root: self.document_root,
                max: self.max_includes,
                template_extensions: self.template_extensions,
                loaded,
            },
        })
    }
}

/// 脚本片段可见的全部接口
pub struct Context {
    id: u128,
    request: Request,
    response: Response,
    session: Session,
    environment: Box<dyn Environment>,
    variables: HashMap<String, String>,
    includes: IncludeResolver,
}

impl Context {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn header(&mut self, line: &str) {
        debug!("[ID{}]追加响应头：{}", self.id, line);
        self.response.append_header(line);
    }

    pub fn echo(&mut self, text: &str) {
        self.response.append_body(text);
    }

    /// 查询参数（值未解码）
    pub fn query(&self) -> &HashMap<String, String> {
        self.request.query()
    }

    /// POST 参数（值已解码）
    pub fn post(&self) -> &HashMap<String, String> {
        self.request.post()
    }

    /// 读取服务器变量，不存在时返回 `None`
    pub fn server_var(&self, name: &str) -> Option<String> {
        self.environment.getenv(name)
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, name: &str, value: String) {
        self.variables.insert(name.to_string(), value);
    }

    /// 加载 include 文件。同一文件重复 include 时返回 `Ok(None)`。
    ///
    /// 加载出的内容由求值器负责执行，参见 [`crate::scanner::include`]。
    pub fn load_include(&mut self, path: &str) -> Result<Option<IncludeSource>, Exception> {
        self.includes.load(path, self.id)
    }

    pub fn session_start(&mut self) -> Result<(), Exception> {
        self.session.start(&mut self.response)
    }

    pub fn session_get(&self, key: &str) -> Option<&SessionValue> {
        self.session.get(key)
    }

    pub fn session_set(&mut self, key: &str, value: SessionValue) -> Result<(), Exception> {
        self.session.set(key, value)
    }

    pub fn session_delete(&mut self, key: &str) -> Result<(), Exception> {
        self.session.delete(key)
    }

    pub fn session_destroy(&mut self) -> Result<bool, Exception> {
        if !self.session.is_started() {
            warn!("[ID{}]在会话开启之前调用了session_destroy", self.id);
        }
        self.session.destroy()
    }

    pub fn session_id(&self) -> Result<&str, Exception> {
        self.session.id()
    }

    pub fn session_status(&self) -> Result<SessionStatus, Exception> {
        self.session.status()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// 交出输出缓冲区，供顶层处理器写出
    pub fn into_response(self) -> Response {
        self.response
    }
}
