// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::path::{Component, Path, PathBuf};

use crate::param::{SERVER_NAME, STATUS_CODES};

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

const PAGE_CSS: &str = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            ";

/// 状态码对应的描述，未知状态码返回 `Unknown`
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("Unknown")
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let description = note.unwrap_or_else(|| reason_phrase(code));
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code,
            escape_html(description)
        );
        Self {
            title: code.to_string(),
            css: PAGE_CSS.to_string(),
            body,
        }
    }

    /// 没有配置首页文件时使用的默认首页
    pub fn welcome() -> Self {
        let body = format!(
            r"
            <h1>Welcome to {}</h1>
            <p>服务器已经正常运行。</p>
            ",
            SERVER_NAME
        );
        Self {
            title: SERVER_NAME.to_string(),
            css: PAGE_CSS.to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 把请求路径映射到根目录下的文件。含有 `..` 或绝对路径成分时拒绝。
pub fn resolve_static(root: &str, url_path: &str) -> Option<PathBuf> {
    let mut path = PathBuf::from(root);
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// 取文件扩展名，用于 MIME 查询
pub fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}
