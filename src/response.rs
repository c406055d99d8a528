// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应
//!
//! 每个连接只构建一个 `Response`。处理过程中可以反复修改状态码、标头与 Cookie，
//! 最后由 [`Response::flush`] 一次性写出，写出后响应即被消耗。

use std::path::Path;

use bytes::Bytes;
use chrono::prelude::*;
use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    cache::{self, SharedCache},
    config::Config,
    cookie::{format_http_date, Cookie},
    exception::Exception,
    param::*,
    request::Request,
    util::{extension_of, reason_phrase, resolve_static, HtmlBuilder},
};

#[derive(Debug, Clone)]
pub struct Response {
    method: HttpRequestMethod,
    status_code: u16,
    information: String,
    content_type: String,
    date: DateTime<Utc>,
    cache_control: &'static str,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    allowed: Vec<HttpRequestMethod>,
    content: Bytes,
    secure: bool,
}

fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

impl Response {
    pub fn new(method: HttpRequestMethod) -> Self {
        Self {
            method,
            status_code: 200,
            information: "OK".to_string(),
            content_type: CONTENT_TYPE_HTML.to_string(),
            date: Utc::now(),
            cache_control: CACHE_CONTROL_DYNAMIC,
            headers: Vec::new(),
            cookies: Vec::new(),
            allowed: Vec::new(),
            content: Bytes::new(),
            secure: false,
        }
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(request.method())
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = content_type.to_string();
        self
    }

    /// 处理器附加的标头，按添加顺序写出。名称与值中的 CR、LF 被去掉。
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((strip_line_breaks(name), strip_line_breaks(value)));
        self
    }

    /// 同名 Cookie 以最后一次设置为准
    pub fn add_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.retain(|c| c.name() != cookie.name());
        self.cookies.push(cookie);
        self
    }

    /// 把一个方法加入 `OPTIONS` 的允许集合
    pub fn allow(&mut self, method: HttpRequestMethod) -> &mut Self {
        if !self.allowed.contains(&method) {
            self.allowed.push(method);
        }
        self
    }

    /// 运行在 TLS 之后时，Cookie 带上 `Secure` 属性
    pub fn set_secure(&mut self, secure: bool) -> &mut Self {
        self.secure = secure;
        self
    }

    pub fn set_body(&mut self, body: Bytes) -> &mut Self {
        self.content = body;
        self
    }

    fn set_static(&mut self) -> &mut Self {
        self.cache_control = CACHE_CONTROL_STATIC;
        self
    }

    /// 按内容类型决定响应体：JSON 响应直接使用给定文本，否则把它当作根目录下的资源路径，
    /// 完整读入内存。空字符串表示没有响应体。
    pub fn execute(
        &mut self,
        body_or_path: &str,
        status: u16,
        cache: &SharedCache,
        config: &Config,
    ) -> Result<(), Exception> {
        self.set_status(status);
        if body_or_path.is_empty() {
            self.content = Bytes::new();
            return Ok(());
        }
        if self.content_type.starts_with(CONTENT_TYPE_JSON)
            && self.method != HttpRequestMethod::Options
        {
            self.content = Bytes::from(body_or_path.to_string());
            return Ok(());
        }
        let path = resolve_static(config.www_root(), body_or_path)
            .ok_or(Exception::StaticResourceMissing)?;
        self.content = cache::load(cache, &path).map_err(|e| {
            debug!("视图{}读取失败：{}", path.display(), e);
            Exception::StaticResourceMissing
        })?;
        Ok(())
    }

    pub fn from_status_code(
        method: HttpRequestMethod,
        code: u16,
        note: Option<&str>,
        id: u128,
    ) -> Self {
        let mut response = Self::new(method);
        response.set_status(code);
        response.content = Bytes::from(HtmlBuilder::from_status_code(code, note).build());
        debug!("[ID{}]生成{}状态页", id, code);
        response
    }

    pub fn not_found(request: &Request, id: u128) -> Self {
        Self::from_status_code(request.method(), 404, None, id)
    }

    pub fn bad_request(request: &Request, note: Option<&str>, id: u128) -> Self {
        Self::from_status_code(request.method(), 400, note, id)
    }

    pub fn method_not_allowed(request: &Request, id: u128) -> Self {
        Self::from_status_code(request.method(), 405, None, id)
    }

    pub fn internal_error(request: &Request, note: Option<&str>, id: u128) -> Self {
        Self::from_status_code(request.method(), 500, note, id)
    }

    /// 从文件构建 200 响应，文件不可读时返回 `None`
    fn from_file(request: &Request, path: &Path, cache: &SharedCache, id: u128) -> Option<Self> {
        match cache::load(cache, path) {
            Ok(bytes) => {
                let mut response = Self::for_request(request);
                response.content_type = mime_for(extension_of(path)).to_string();
                response.content = bytes;
                Some(response)
            }
            Err(e) => {
                debug!("[ID{}]无法读取文件{}：{}", id, path.display(), e);
                None
            }
        }
    }

    pub fn favicon(request: &Request, cache: &SharedCache, config: &Config, id: u128) -> Self {
        match Self::from_file(request, Path::new(config.favicon()), cache, id) {
            Some(mut response) => {
                response.set_content_type(CONTENT_TYPE_ICON).set_static();
                response
            }
            None => Self::not_found(request, id),
        }
    }

    /// 根路径的首页，首页文件缺失时使用内置页面
    pub fn index_file(request: &Request, cache: &SharedCache, config: &Config, id: u128) -> Self {
        match Self::from_file(request, Path::new(config.index_file()), cache, id) {
            Some(mut response) => {
                response.set_content_type(CONTENT_TYPE_HTML);
                response
            }
            None => {
                warn!("[ID{}]首页文件{}不存在，使用内置页面", id, config.index_file());
                let mut response = Self::for_request(request);
                response.content = Bytes::from(HtmlBuilder::welcome().build());
                response
            }
        }
    }

    /// 静态资源前缀下的文件
    pub fn static_resource(
        request: &Request,
        cache: &SharedCache,
        config: &Config,
        id: u128,
    ) -> Self {
        let path = match resolve_static(config.www_root(), request.path()) {
            Some(p) => p,
            None => {
                warn!("[ID{}]拒绝越界的静态资源路径：{}", id, request.path());
                return Self::not_found(request, id);
            }
        };
        match Self::from_file(request, &path, cache, id) {
            Some(mut response) => {
                response.set_static();
                response
            }
            None => Self::not_found(request, id),
        }
    }

    /// 没有路由匹配时，尝试根目录下的同名文件
    pub fn from_www_root(
        request: &Request,
        cache: &SharedCache,
        config: &Config,
        id: u128,
    ) -> Option<Self> {
        let path = resolve_static(config.www_root(), request.path())?;
        Self::from_file(request, &path, cache, id)
    }

    /// `OPTIONS` 应答：只有 `Allow` 标头，没有响应体
    pub fn options(mut self) -> Self {
        self.set_status(200);
        self.content = Bytes::new();
        self
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn allowed(&self) -> &[HttpRequestMethod] {
        &self.allowed
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    pub fn cache_control(&self) -> &str {
        self.cache_control
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "HTTP/1.1 {} {}{}",
            self.status_code, self.information, CRLF
        );
        // 标头行内不允许出现换行，否则会拆分响应
        let mut line = |name: &str, value: &str| {
            header.push_str(&strip_line_breaks(name));
            header.push_str(": ");
            header.push_str(&strip_line_breaks(value));
            header.push_str(CRLF);
        };
        line("Server", SERVER_NAME);
        line("Date", &format_http_date(&self.date));
        line("Content-Type", &self.content_type);
        // HEAD 响应不带响应体，但长度与 GET 一致
        line("Content-Length", &self.content.len().to_string());
        line("Accept-Ranges", "bytes");
        line("Connection", "Keep-Alive");
        line("Keep-Alive", "timeout=60");
        line("Cache-Control", self.cache_control);
        if self.method == HttpRequestMethod::Options && !self.allowed.is_empty() {
            let allow: Vec<String> = self.allowed.iter().map(|m| m.to_string()).collect();
            line("Allow", &allow.join(", "));
        }
        for (name, value) in &self.headers {
            line(name, value);
        }
        for cookie in &self.cookies {
            line("Set-Cookie", &cookie.to_header_value(self.secure));
        }
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        if self.method != HttpRequestMethod::Head {
            bytes.extend_from_slice(&self.content);
        }
        bytes
    }

    /// 写出完整响应。每个响应只能写出一次。
    pub async fn flush<W: AsyncWrite + Unpin>(self, writer: &mut W) -> Result<(), Exception> {
        let bytes = self.as_bytes();
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}
