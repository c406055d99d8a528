// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # webengine 服务端程序
//!
//! 载入配置与日志，登记路由表，启动接受循环和后台管理控制台。
//! 控制台支持的指令：
//! - `stop` 发出停机信号
//! - `status` 查看活跃连接数
//! - `sessions` 查看当前会话数
//! - `help` 显示帮助

use std::sync::Arc;

use log::{error, info};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
};

use webengine::{
    config::Config,
    route::{HandlerFault, ParamSpec, ParamType, Reply, Route, RouteTable},
    Arg, Invocation, Server,
};

fn hello(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let name = inv.value(0).cloned().unwrap_or(Value::Null);
    Ok(Reply::Json(json!({ "message": "hello", "name": name })))
}

fn show_user(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let id = inv.value(0).cloned().unwrap_or(Value::Null);
    Ok(Reply::Json(json!({ "id": id })))
}

fn create_user(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let user = inv.value(0).cloned().unwrap_or(Value::Null);
    inv.response().set_status(201);
    Ok(Reply::Json(user))
}

fn upload(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let files = match inv.request().files() {
        Some(files) => files,
        None => return Err(HandlerFault::from("需要multipart/form-data请求体")),
    };
    let listing: Vec<Value> = files
        .values()
        .flat_map(|field| field.files())
        .map(|f| {
            json!({
                "field": f.field_name(),
                "file": f.file_name(),
                "type": f.content_type(),
                "size": f.len(),
            })
        })
        .collect();
    Ok(Reply::Json(Value::Array(listing)))
}

fn visits(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let session = match inv.arg(0) {
        Some(Arg::Session(session)) => session.clone(),
        _ => inv.session_or_create(),
    };
    let count = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
    session.set("visits", json!(count));
    Ok(Reply::Json(json!({ "session": session.id(), "visits": count })))
}

fn logout(inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    let invalidated = inv.session().map_or(false, |s| s.invalidate());
    Ok(Reply::Json(json!({ "invalidated": invalidated })))
}

fn routes() -> RouteTable {
    RouteTable::builder()
        .add(
            Route::get("/api/hello", hello)
                .rest()
                .param(ParamSpec::value_or("name", ParamType::Str, "world")),
        )
        .group("/users", |g| {
            g.add(
                Route::get("/{id}", show_user)
                    .rest()
                    .param(ParamSpec::value("id", ParamType::Int)),
            )
            .add(
                Route::post("", create_user)
                    .rest()
                    .param(ParamSpec::object("user", "User")),
            )
        })
        .add(Route::post("/upload", upload).rest())
        .group("/session", |g| {
            g.add(Route::get("/visits", visits).rest().param(ParamSpec::Session))
                .add(Route::post("/logout", logout).rest())
        })
        .build()
}

fn main() {
    // 日志系统通过外部 YAML 配置级别与输出目的地
    log4rs::init_file("config/log4rs.yaml", Default::default()).expect("无法初始化日志系统");

    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .expect("无法创建异步运行时");

    let server = Arc::new(Server::builder(config).routes(routes()).build());

    runtime.block_on(async {
        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", server.config().port(), e);
                return;
            }
        };

        // 管理控制台在后台运行，不阻塞接受循环
        tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                let mut reader = BufReader::new(tokio::io::stdin());
                let mut input = String::new();
                loop {
                    input.clear();
                    match reader.read_line(&mut input).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    match input.trim() {
                        "stop" => {
                            server.stop();
                            println!("停机指令已激活，服务器将停止接受新连接...");
                            break;
                        }
                        "help" => {
                            println!("== webengine Help ==");
                            println!("stop     - 发出停机信号");
                            println!("status   - 查看当前服务器运行状态");
                            println!("sessions - 查看当前会话数");
                            println!("help     - 显示此帮助信息");
                            println!("====================");
                        }
                        "status" => {
                            println!("== webengine 状态 ===");
                            println!("当前活跃连接数: {}", server.active_connections());
                            println!("====================");
                        }
                        "sessions" => {
                            println!("当前会话数: {}", server.sessions().len());
                        }
                        "" => {}
                        cmd => println!("无效的命令：{}", cmd),
                    }
                }
            }
        });

        if let Err(e) = Arc::clone(&server).serve(listener).await {
            error!("服务器异常退出：{}", e);
        }
        info!("服务器已停止");
    });
}
