// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # multipart/form-data 解析
//!
//! 以状态机的方式逐个解析分段：
//! 1. `Preamble`：跳过第一个边界之前的全部内容。
//! 2. `AfterBoundary`：边界之后若紧跟 `--` 表示结束，紧跟 CRLF 表示还有下一个分段。
//! 3. `PartHeaders`：读取 `Content-Disposition` 等分段头，带 `filename` 的分段是文件。
//! 4. `FileData` / `FieldValue`：读取数据直到下一个边界，去掉边界前的 CRLF。

use std::collections::HashMap;

use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use tokio::io::AsyncRead;

use crate::{cursor::ByteCursor, exception::Exception, request::limit_error};

lazy_static! {
    static ref FIELD_NAME: Regex = Regex::new(r#"(?i)(?:^|[;\s])name="([^"]*)""#).unwrap();
    static ref FILE_NAME: Regex = Regex::new(r#"(?i)filename="([^"]*)""#).unwrap();
}

/// 上传的单个文件
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFile {
    field_name: String,
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

impl MultipartFile {
    pub fn new(field_name: &str, file_name: &str, content_type: &str, bytes: Bytes) -> Self {
        Self {
            field_name: field_name.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 同一字段名下的一个或多个文件
#[derive(Debug, Clone, PartialEq)]
pub enum FileField {
    Single(MultipartFile),
    Many(Vec<MultipartFile>),
}

impl FileField {
    fn push(self, file: MultipartFile) -> Self {
        match self {
            FileField::Single(first) => FileField::Many(vec![first, file]),
            FileField::Many(mut files) => {
                files.push(file);
                FileField::Many(files)
            }
        }
    }

    /// 第一个文件，`Many` 为空时返回 `None`
    pub fn first(&self) -> Option<&MultipartFile> {
        match self {
            FileField::Single(file) => Some(file),
            FileField::Many(files) => files.first(),
        }
    }

    pub fn files(&self) -> Vec<&MultipartFile> {
        match self {
            FileField::Single(file) => vec![file],
            FileField::Many(files) => files.iter().collect(),
        }
    }
}

/// 解析结果：普通字段进入参数表，文件按字段名归组
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: HashMap<String, FileField>,
}

impl MultipartForm {
    fn add_file(&mut self, file: MultipartFile) {
        let name = file.field_name().to_string();
        let field = match self.files.remove(&name) {
            Some(existing) => existing.push(file),
            None => FileField::Single(file),
        };
        self.files.insert(name, field);
    }
}

enum State {
    Preamble,
    AfterBoundary,
    PartHeaders,
    FileData {
        name: String,
        file_name: String,
        content_type: String,
    },
    FieldValue {
        name: String,
    },
    Done,
}

/// 从 `Content-Type` 头中提取边界参数，返回带 `--` 前缀的边界标记
pub fn boundary_marker(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                None
            } else {
                Some(format!("--{}", value))
            }
        } else {
            None
        }
    })
}

/// 解析 multipart 请求体。`boundary` 为带 `--` 前缀的边界标记。
pub async fn parse_multipart<R: AsyncRead + Unpin>(
    cursor: &mut ByteCursor<R>,
    boundary: &str,
    id: u128,
) -> Result<MultipartForm, Exception> {
    let marker = boundary.as_bytes();
    let delimiter = [b"\r\n", marker].concat();
    let mut form = MultipartForm::default();
    let mut state = State::Preamble;

    loop {
        state = match state {
            State::Preamble => {
                if cursor.skip_past(marker).await.map_err(limit_error)? {
                    State::AfterBoundary
                } else {
                    warn!("[ID{}]multipart请求体中没有找到边界{}", id, boundary);
                    State::Done
                }
            }
            State::AfterBoundary => {
                let tail = cursor.read_exact_bytes(2).await.map_err(limit_error)?;
                match tail.as_slice() {
                    b"--" => State::Done,
                    b"\r\n" => State::PartHeaders,
                    _ => {
                        warn!("[ID{}]multipart边界之后的字节不合法", id);
                        return Err(Exception::MalformedRequest);
                    }
                }
            }
            State::PartHeaders => {
                let mut name = None;
                let mut file_name = None;
                let mut content_type = "application/octet-stream".to_string();
                loop {
                    let line = match cursor.read_line().await.map_err(limit_error)? {
                        Some(l) => l,
                        None => return Err(Exception::MalformedRequest),
                    };
                    if line.is_empty() {
                        break;
                    }
                    let (key, value) = match line.split_once(':') {
                        Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
                        None => continue,
                    };
                    if key == "content-disposition" {
                        name = FIELD_NAME
                            .captures(value)
                            .and_then(|c| c.get(1))
                            .map(|m| m.as_str().to_string());
                        file_name = FILE_NAME
                            .captures(value)
                            .and_then(|c| c.get(1))
                            .map(|m| m.as_str().to_string());
                    } else if key == "content-type" {
                        content_type = value.to_string();
                    }
                }
                let name = match name {
                    Some(n) => n,
                    None => {
                        warn!("[ID{}]multipart分段缺少字段名", id);
                        return Err(Exception::MalformedRequest);
                    }
                };
                match file_name {
                    Some(file_name) => State::FileData {
                        name,
                        file_name,
                        content_type,
                    },
                    None => State::FieldValue { name },
                }
            }
            State::FileData {
                name,
                file_name,
                content_type,
            } => {
                let data = match cursor.read_until(&delimiter).await.map_err(limit_error)? {
                    Some(d) => d,
                    None => return Err(Exception::MalformedRequest),
                };
                if data.is_empty() {
                    debug!("[ID{}]文件字段{}没有内容，已跳过", id, name);
                } else {
                    debug!(
                        "[ID{}]收到文件字段{}：{}，{} bytes",
                        id,
                        name,
                        file_name,
                        data.len()
                    );
                    form.add_file(MultipartFile::new(
                        &name,
                        &file_name,
                        &content_type,
                        Bytes::from(data),
                    ));
                }
                State::AfterBoundary
            }
            State::FieldValue { name } => {
                let data = match cursor.read_until(&delimiter).await.map_err(limit_error)? {
                    Some(d) => d,
                    None => return Err(Exception::MalformedRequest),
                };
                let value = String::from_utf8_lossy(&data).into_owned();
                form.fields.push((name, value));
                State::AfterBoundary
            }
            State::Done => break,
        };
    }
    Ok(form)
}
