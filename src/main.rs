// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # CGI 模板引擎入口
//!
//! 每次调用处理一个请求：
//! 1. 载入配置并初始化日志（日志只写文件，标准输出留给响应）。
//! 2. 确定模板文件与文档根目录。
//! 3. 从环境变量与标准输入收集请求数据，以文件会话存储和内置指令求值器执行模板。
//! 4. 结果写入标准输出。

use std::{
    io::{self, Write},
    path::PathBuf,
};

use log::{error, info};

use webscript::{
    config::{Config, CONFIG_ENV_VAR},
    engine::emit_diagnostic,
    util::{locate_script, read_template},
    ContextBuilder, DirectiveEvaluator, Engine, Environment, FileSessionStore, Outcome,
    ProcessEnvironment,
};

fn main() {
    let config = Config::load(std::env::var(CONFIG_ENV_VAR).ok());
    if let Err(e) = log4rs::init_file(config.log_config(), Default::default()) {
        eprintln!("无法初始化日志系统（{}）：{}", config.log_config(), e);
    }

    let id = std::process::id() as u128;
    let env = ProcessEnvironment;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let template = match locate_script(&env, std::env::args().nth(1), id)
        .and_then(|location| {
            read_template(&location.template, id)
                .map(|text| (text, location.template, location.document_root))
        }) {
        Ok(found) => found,
        Err(e) => {
            error!("[ID{}]无法载入模板：{}", id, e);
            if let Err(e) = emit_diagnostic(&e.to_string(), &mut out) {
                error!("[ID{}]写出诊断页面失败：{}", id, e);
            }
            return;
        }
    };
    let (text, template_path, document_root) = template;
    info!("[ID{}]开始处理请求，文档根目录：{}", id, document_root.display());

    let store = FileSessionStore::new(
        PathBuf::from(config.session_dir()),
        env.getenv("HTTP_COOKIE"),
        id,
    );
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let builder = ContextBuilder::from_cgi(Box::new(env), Box::new(store), &mut input, id)
        .document_root(document_root)
        .template_path(template_path)
        .config(&config);

    let mut engine = Engine::new(DirectiveEvaluator::new());
    match engine.run(&text, builder, &mut out) {
        Ok(Outcome::Failed) => info!("[ID{}]请求以诊断页面结束", id),
        Ok(outcome) => info!("[ID{}]请求处理完毕：{:?}", id, outcome),
        Err(e) => error!("[ID{}]写出响应失败：{}", id, e),
    }
    if let Err(e) = out.flush() {
        error!("[ID{}]刷新标准输出失败：{}", id, e);
    }
}
