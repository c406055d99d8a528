// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Cookie 编解码
//!
//! 解析请求中的 `Cookie:` 头，并把响应上的 Cookie 渲染为 `Set-Cookie:` 行。
//! Cookie 属于单次请求/响应交换，由正在构建的 `Response` 持有。

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    name: String,
    value: String,
    path: String,
    /// 秒，0 表示会话 Cookie
    max_age: i64,
    expires: Option<DateTime<Utc>>,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            max_age: 0,
            expires: None,
            http_only: false,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// 设置存活秒数，同时据此推导过期时间
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self.expires = match seconds {
            0 => None,
            s => Some(Utc::now() + Duration::seconds(s)),
        };
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    /// 渲染为 `Set-Cookie` 头的值（不含头名）
    pub fn to_header_value(&self, secure: bool) -> String {
        let mut line = format!("{}={}", self.name, self.value);
        if self.max_age != 0 {
            if let Some(expires) = self.expires {
                line.push_str(&format!("; Expires={}", format_http_date(&expires)));
            }
            line.push_str(&format!("; Max-Age={}", self.max_age));
        }
        if secure {
            line.push_str("; Secure");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        line.push_str(&format!("; Path={}", self.path));
        line
    }
}

/// 解析 `Cookie:` 头的值。同名 Cookie 以后出现者为准。
pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
    let mut cookies: Vec<Cookie> = Vec::new();
    for pair in value.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim().trim_matches('"')),
            None => (pair, ""),
        };
        if name.is_empty() {
            continue;
        }
        cookies.retain(|c| c.name != name);
        cookies.push(Cookie::new(name, value));
    }
    cookies
}

/// RFC 1123 格式的 HTTP 日期
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
