// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 传播规则
//! - **解析阶段**：`MalformedRequest`、`RequestTooLarge` 与 `Io` 不会进入路由，连接被直接关闭。
//! - **路由与绑定阶段**：`RouteNotFound`、`MethodNotAllowed`、`BindingFault` 在处理器运行前被转换为响应。
//! - **处理器阶段**：`HandlerFault` 在调用边界被捕获并转换为 500 响应，绝不会终止工作任务。

use std::fmt;
use std::io;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求头块为空、无法解码或请求行不合法。连接被静默关闭。
    MalformedRequest,
    /// 请求头或请求体超过了配置的上限。与 `MalformedRequest` 同样处理。
    RequestTooLarge,
    /// 没有任何路由与请求路径匹配。对应 `404 Not Found`。
    RouteNotFound,
    /// 路径存在但方法不匹配。对应 `405 Method Not Allowed`。
    MethodNotAllowed,
    /// 参数类型转换失败。对应 `400 Bad Request`，附带失败描述。
    BindingFault(String),
    /// 处理器执行失败。对应 `500 Internal Server Error`，附带失败描述。
    HandlerFault(String),
    /// 静态资源目录下不存在请求的文件。对应 `404 Not Found`。
    StaticResourceMissing,
    /// 底层套接字读写失败。
    Io(String),
}

use Exception::*;

impl Exception {
    /// 异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            MalformedRequest | RequestTooLarge | BindingFault(_) => 400,
            RouteNotFound | StaticResourceMissing => 404,
            MethodNotAllowed => 405,
            HandlerFault(_) | Io(_) => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed HTTP request"),
            RequestTooLarge => write!(f, "Request exceeds the configured size limit"),
            RouteNotFound => write!(f, "No route matches the request (404)"),
            MethodNotAllowed => write!(f, "Method not allowed for this path (405)"),
            BindingFault(msg) => write!(f, "Parameter binding failed: {}", msg),
            HandlerFault(msg) => write!(f, "Handler failed: {}", msg),
            StaticResourceMissing => write!(f, "Static resource not found (404)"),
            Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Exception {}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e.to_string())
    }
}
