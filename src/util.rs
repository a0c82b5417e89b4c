use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Timelike, Utc};
use log::{debug, error};

use crate::{environment::Environment, exception::Exception};

/// 诊断页面构建器。
///
/// 与正常响应不同，诊断页面不经过输出缓冲区，只是一个固定的 HTML 外壳。
pub struct HtmlBuilder {
    body: String,
}

impl HtmlBuilder {
    /// 根据失败描述构建页面，描述中的换行会被替换为 `<br/>` 标签。
    pub fn from_failure(description: &str) -> Self {
        let body = format!("{}<br/>", description.replace('\n', "<br/>\n"));
        Self { body }
    }

    pub fn build(&self) -> String {
        format!("<html><body>\n{}\n</body></html>\n", self.body)
    }
}

/// 生成新的会话标识：`sess` + 10 位进程号 + 6 位当前微秒数，共 20 个字符。
pub fn generate_session_id() -> String {
    let pid = std::process::id();
    let micros = Utc::now().nanosecond() / 1_000 % 1_000_000;
    format!("sess{:010}{:06}", pid, micros)
}

/// 一次调用所要执行的模板及其文档根目录
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLocation {
    pub template: PathBuf,
    pub document_root: PathBuf,
}

/// 确定模板文件和文档根目录。
///
/// 以 CGI 方式运行时（`GATEWAY_INTERFACE` 以 `CGI/` 开头），模板就是 `SCRIPT_FILENAME`，
/// 文档根目录是 `SCRIPT_FILENAME` 中位于 `SCRIPT_NAME` 之前的部分；
/// 独立运行时模板由命令行参数给出，文档根目录为当前工作目录。
pub fn locate_script(
    env: &dyn Environment,
    arg: Option<String>,
    id: u128,
) -> Result<ScriptLocation, Exception> {
    let is_cgi = env
        .getenv("GATEWAY_INTERFACE")
        .map_or(false, |g| g.starts_with("CGI/"));

    if is_cgi {
        let script_file = env.getenv("SCRIPT_FILENAME");
        let script_name = env.getenv("SCRIPT_NAME");
        let (script_file, script_name) = match (script_file, script_name) {
            (Some(f), Some(n)) => (f, n),
            _ => {
                error!("[ID{}]缺少SCRIPT_NAME/SCRIPT_FILENAME环境变量", id);
                return Err(Exception::TemplateNotFound(
                    "SCRIPT_NAME/SCRIPT_FILENAME missing".to_string(),
                ));
            }
        };
        let relative = script_name.trim_start_matches('/');
        let root = match script_file.find(relative) {
            Some(pos) if !relative.is_empty() => &script_file[..pos],
            _ => {
                error!("[ID{}]SCRIPT_FILENAME中找不到SCRIPT_NAME", id);
                return Err(Exception::TemplateNotFound(script_file.clone()));
            }
        };
        debug!("[ID{}]CGI文档根目录：{}", id, root);
        Ok(ScriptLocation {
            template: PathBuf::from(&script_file),
            document_root: PathBuf::from(root),
        })
    } else {
        let template = match arg {
            Some(a) => PathBuf::from(a),
            None => {
                return Err(Exception::TemplateNotFound(
                    "no template given on the command line".to_string(),
                ))
            }
        };
        let document_root = std::env::current_dir()
            .map_err(|e| Exception::TemplateNotFound(format!("current directory: {}", e)))?;
        debug!("[ID{}]非CGI文档根目录：{}", id, document_root.display());
        Ok(ScriptLocation {
            template,
            document_root,
        })
    }
}

/// 读取模板文件内容
pub fn read_template(path: &Path, id: u128) -> Result<String, Exception> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            error!("[ID{}]无法读取模板{}：{}", id, path.display(), e);
            Err(Exception::TemplateNotFound(path.display().to_string()))
        }
    }
}

/// 检查 include 路径是否试图跳出文档根目录
pub fn is_safe_relative(path: &Path) -> bool {
    path.components().all(|c| {
        matches!(
            c,
            std::path::Component::Normal(_) | std::path::Component::CurDir
        )
    })
}
