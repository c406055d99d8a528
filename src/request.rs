// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责把连接上的原始字节流解析为不可变的 `Request`。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、路径、协议版本）。
//! 2. 标头（Headers）的提取，`Cookie` 头交给 Cookie 编解码处理。
//! 3. 查询字符串与表单请求体的解码。
//! 4. JSON 请求体与 multipart/form-data 请求体的读取。
//!
//! 每个连接只解析一次；解析结果在之后的路由、调用、响应阶段都是只读的。

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::io::AsyncRead;

use crate::{
    config::Config,
    cookie::{parse_cookie_header, Cookie},
    cursor::ByteCursor,
    exception::Exception,
    multipart::{boundary_marker, parse_multipart, FileField, MultipartFile},
    param::*,
};

/// 请求的两种形态：普通请求与携带上传文件的 multipart 请求
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Plain,
    Multipart(HashMap<String, FileField>),
}

/// 表示一个完整解析后的 HTTP 请求。
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// 协议版本字符串，例如 `HTTP/1.1`
    protocol: String,
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求路径（不含查询字符串，除根路径外不以 `/` 结尾）
    path: String,
    /// 标头，键名统一为小写
    headers: HashMap<String, String>,
    /// 查询字符串与请求体合并后的参数表
    parameters: HashMap<String, String>,
    /// 原始 JSON 请求体
    json_body: Option<String>,
    cookies: Vec<Cookie>,
    /// 声明的内容类型（不含参数部分，小写）
    content_type: Option<String>,
    kind: RequestKind,
}

/// 解析过程中的尺寸与时间上限
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub max_header_size: usize,
    pub max_body_size: usize,
    /// 没有 `Content-Length` 时，超过该时长没有新数据即认为请求体结束
    pub body_idle: Duration,
}

impl ParseLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_header_size: config.max_header_size(),
            max_body_size: config.max_body_size(),
            body_idle: Duration::from_millis(config.body_idle_timeout_ms()),
        }
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from_config(&Config::new())
    }
}

/// 缓冲区超过上限时读取器返回 `InvalidData`，对应请求过大
pub(crate) fn limit_error(e: io::Error) -> Exception {
    match e.kind() {
        io::ErrorKind::InvalidData => Exception::RequestTooLarge,
        _ => Exception::from(e),
    }
}

impl Request {
    /// 从连接中读取并解析一个请求。
    ///
    /// # 返回值
    /// * `Ok(Some(request))` - 解析成功。
    /// * `Ok(None)` - 不是 HTTP 请求（空的或乱码的请求头块），调用方应静默关闭连接。
    /// * `Err(e)` - 超出尺寸上限或读取套接字失败。
    pub async fn parse<R: AsyncRead + Unpin>(
        cursor: &mut ByteCursor<R>,
        limits: &ParseLimits,
        id: u128,
    ) -> Result<Option<Self>, Exception> {
        // 1. 读取请求头块，直到 CRLF CRLF
        cursor.set_limit(limits.max_header_size);
        let head = match cursor.read_until(HEADER_TERMINATOR).await.map_err(limit_error)? {
            Some(h) => h,
            None => {
                debug!("[ID{}]请求头结束之前连接已关闭", id);
                return Ok(None);
            }
        };
        let head = match String::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]请求头不是合法的UTF-8", id);
                return Ok(None);
            }
        };
        let mut lines = head.split(CRLF);

        // 2. 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let request_line = lines.next().unwrap_or("").trim();
        if request_line.is_empty() {
            return Ok(None);
        }
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Ok(None);
        }
        let method = match HttpRequestMethod::from_token(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Ok(None);
            }
        };
        let protocol = parts[2].to_uppercase();
        if !protocol.starts_with("HTTP/") {
            error!("[ID{}]不支持的协议：{}", id, parts[2]);
            return Ok(None);
        }

        // 3. 解析标头，Cookie 单独处理
        let mut headers: HashMap<String, String> = HashMap::new();
        let mut cookies = Vec::new();
        for line in lines {
            let (key, value) = match line.split_once(':') {
                Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
                None => {
                    if !line.trim().is_empty() {
                        warn!("[ID{}]忽略格式错误的标头：{}", id, line);
                    }
                    continue;
                }
            };
            if key == "cookie" {
                for cookie in parse_cookie_header(value) {
                    cookies.retain(|c: &Cookie| c.name() != cookie.name());
                    cookies.push(cookie);
                }
                continue;
            }
            headers
                .entry(key)
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        // 4. 分离路径与查询字符串
        let (raw_path, query) = match parts[1].split_once('?') {
            Some((p, q)) => (p, q),
            None => (parts[1], ""),
        };
        let path = normalize_path(raw_path);
        let mut parameters: HashMap<String, String> = parse_query(query).into_iter().collect();

        // 5. 内容类型与 multipart 边界
        let declared = headers.get("content-type").cloned();
        let content_type = declared
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase());
        let boundary = match content_type.as_deref() {
            Some(CONTENT_TYPE_MULTIPART) => declared.as_deref().and_then(boundary_marker),
            _ => None,
        };

        // 6. 读取请求体
        let mut json_body = None;
        let mut kind = RequestKind::Plain;
        if method.has_body() {
            cursor.set_limit(limits.max_body_size);
            let content_length = match headers.get("content-length") {
                Some(v) => match v.parse::<usize>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        error!("[ID{}]Content-Length不是合法数字：{}", id, v);
                        return Ok(None);
                    }
                },
                None => None,
            };
            if let Some(n) = content_length {
                if n > limits.max_body_size {
                    warn!("[ID{}]请求体{}字节超过上限{}", id, n, limits.max_body_size);
                    return Err(Exception::RequestTooLarge);
                }
            }

            match boundary {
                Some(boundary) => {
                    debug!("[ID{}]按multipart解析请求体，边界：{}", id, boundary);
                    let form = parse_multipart(cursor, &boundary, id).await?;
                    parameters.extend(form.fields);
                    kind = RequestKind::Multipart(form.files);
                }
                None => {
                    let body = match content_length {
                        Some(n) => cursor.read_exact_bytes(n).await.map_err(limit_error)?,
                        None => cursor
                            .read_available(limits.body_idle)
                            .await
                            .map_err(limit_error)?,
                    };
                    let text = String::from_utf8_lossy(&body).into_owned();
                    debug!("[ID{}]读取请求体{}字节", id, body.len());
                    let is_json = content_type
                        .as_deref()
                        .map_or(false, |ct| ct == CONTENT_TYPE_JSON || ct.ends_with("+json"));
                    // JSON 请求体只在没有查询参数时保留原文，否则按查询字符串解码合并
                    if is_json && parameters.is_empty() {
                        json_body = Some(text);
                    } else if !text.is_empty() {
                        parameters.extend(parse_query(text.trim_end_matches(CRLF)));
                    }
                }
            }
        }

        Ok(Some(Self {
            protocol,
            method,
            path,
            headers,
            parameters,
            json_body,
            cookies,
            content_type,
            kind,
        }))
    }

    /// 从一段完整的字节中解析请求，主要用于测试与基准
    pub async fn from_bytes(buffer: &[u8], id: u128) -> Result<Option<Self>, Exception> {
        let limits = ParseLimits::default();
        let mut cursor = ByteCursor::new(buffer, limits.max_header_size);
        Self::parse(&mut cursor, &limits, id).await
    }
}

/// 路径统一小写，解码百分号编码，并去掉结尾的 `/`（根路径除外）
fn normalize_path(raw: &str) -> String {
    let decoded = match urlencoding::decode(raw) {
        Ok(d) => d.into_owned(),
        Err(_) => raw.to_string(),
    };
    let mut path = decoded.to_lowercase();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

fn decode_component(raw: &str) -> String {
    let replaced = raw.replace('+', " ");
    match urlencoding::decode(&replaced) {
        Ok(d) => d.into_owned(),
        Err(_) => replaced,
    }
}

/// 解码 `key=value&...` 形式的查询字符串。没有 `=` 的键得到空字符串值。
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// 把键值对编码为查询字符串
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<String>>()
        .join("&")
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取协议版本字符串
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// 按名称查询标头，大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|v| v.as_str())
    }

    pub fn json_body(&self) -> Option<&str> {
        self.json_body.as_deref()
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name() == name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.kind, RequestKind::Multipart(_))
    }

    /// multipart 请求中按字段名归组的上传文件
    pub fn files(&self) -> Option<&HashMap<String, FileField>> {
        match &self.kind {
            RequestKind::Multipart(files) => Some(files),
            RequestKind::Plain => None,
        }
    }

    /// 某个字段下的第一个上传文件
    pub fn file(&self, name: &str) -> Option<&MultipartFile> {
        self.files()?.get(name)?.first()
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
}
