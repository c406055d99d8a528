// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试公用的启动与收发工具

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use webengine::{config::Config, route::RouteTable, Server};

pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<Server>,
    pub root: TempDir,
}

/// 在临时目录上启动服务器，监听随机端口
pub async fn start(routes: RouteTable) -> TestServer {
    start_with(routes, |config| config).await
}

pub async fn start_with(routes: RouteTable, tweak: impl FnOnce(Config) -> Config) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("resources")).unwrap();
    std::fs::write(root.path().join("resources/app.css"), "body{}").unwrap();
    let root_str = root.path().to_string_lossy().to_string();
    let config = Config::new()
        .with_www_root(&root_str)
        .with_index_file(&format!("{}/no-index.html", root_str))
        .with_favicon(&format!("{}/no-favicon.ico", root_str));
    let server = Arc::new(Server::builder(tweak(config)).routes(routes).build());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).serve(listener));
    TestServer { addr, server, root }
}

/// 发送原始字节并读取完整响应，服务器在写出后关闭连接
pub async fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buffer = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .expect("响应超时")
        .unwrap();
    String::from_utf8_lossy(&buffer).to_string()
}

pub fn status_of(response: &str) -> u16 {
    response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

pub fn header_of<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.split("\r\n").skip(1).find_map(|line| {
        let (key, value) = line.split_once(": ")?;
        if key.eq_ignore_ascii_case(name) {
            Some(value)
        } else {
            None
        }
    })
}

pub fn headers_named<'a>(response: &'a str, name: &str) -> Vec<&'a str> {
    let head = response.split("\r\n\r\n").next().unwrap_or("");
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(": "))
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
        .collect()
}

pub fn body_of(response: &str) -> &str {
    match response.split_once("\r\n\r\n") {
        Some((_, body)) => body,
        None => "",
    }
}
