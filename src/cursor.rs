// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 字节游标
//!
//! 对连接输入流的增量读取器。所有查找操作只在已收到的字节上进行，
//! 不足时才向套接字追加读取，因此可以容忍对端把一行或一个分段拆成多次发送。
//!
//! 内部缓冲区在写满时按容量翻倍增长，直到达到配置的上限。

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

const INITIAL_CAPACITY: usize = 1024;

pub struct ByteCursor<R> {
    reader: R,
    buf: Vec<u8>,
    /// 已消费位置
    head: usize,
    /// 已填充位置
    tail: usize,
    eof: bool,
    limit: usize,
}

impl<R: AsyncRead + Unpin> ByteCursor<R> {
    /// `limit` 为缓冲区能增长到的最大字节数
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            reader,
            buf: vec![0; INITIAL_CAPACITY.min(limit.max(1))],
            head: 0,
            tail: 0,
            eof: false,
            limit: limit.max(1),
        }
    }

    /// 调整缓冲上限。请求头与请求体使用不同的上限。
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(self.buf.len());
    }

    pub fn is_eof(&self) -> bool {
        self.eof && self.head == self.tail
    }

    /// 当前已缓冲但尚未消费的字节数
    pub fn buffered(&self) -> usize {
        self.tail - self.head
    }

    /// 从套接字追加读取一次，返回新读到的字节数，0 表示对端已关闭
    async fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        if self.head > 0 {
            self.buf.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }
        if self.tail == self.buf.len() {
            if self.buf.len() >= self.limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "buffer limit exceeded",
                ));
            }
            let new_len = (self.buf.len() * 2).min(self.limit);
            self.buf.resize(new_len, 0);
        }
        let n = self.reader.read(&mut self.buf[self.tail..]).await?;
        if n == 0 {
            self.eof = true;
        }
        self.tail += n;
        Ok(n)
    }

    fn find(&self, delim: &[u8], from: usize) -> Option<usize> {
        if delim.is_empty() || self.tail < from + delim.len() {
            return None;
        }
        self.buf[from..self.tail]
            .windows(delim.len())
            .position(|w| w == delim)
            .map(|p| p + from)
    }

    /// 读取直到遇到 `delim`，返回分隔符之前的字节并消费分隔符。
    /// 若流在分隔符出现前结束则返回 `None`，已缓冲的字节保持不变。
    pub async fn read_until(&mut self, delim: &[u8]) -> io::Result<Option<Vec<u8>>> {
        let mut scanned = 0;
        loop {
            let from = self.head + scanned;
            if let Some(pos) = self.find(delim, from) {
                let bytes = self.buf[self.head..pos].to_vec();
                self.head = pos + delim.len();
                return Ok(Some(bytes));
            }
            // 下次从可能跨越边界的位置继续查找，避免重复扫描
            scanned = self.buffered().saturating_sub(delim.len().saturating_sub(1));
            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    /// 跳过直到 `delim` 之后，丢弃中间的字节。返回是否找到。
    pub async fn skip_past(&mut self, delim: &[u8]) -> io::Result<bool> {
        loop {
            if let Some(pos) = self.find(delim, self.head) {
                self.head = pos + delim.len();
                return Ok(true);
            }
            // 保留可能构成分隔符前缀的尾部
            let keep = delim.len().saturating_sub(1).min(self.buffered());
            self.head = self.tail - keep;
            if self.fill().await? == 0 {
                return Ok(false);
            }
        }
    }

    /// 读取一行（以 CRLF 结束），返回不含行结束符的文本
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self
            .read_until(b"\r\n")
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// 精确读取 `n` 个字节。流提前结束时返回已读到的部分。
    pub async fn read_exact_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.buffered() < n {
            if self.fill().await? == 0 {
                break;
            }
        }
        let take = n.min(self.buffered());
        let bytes = self.buf[self.head..self.head + take].to_vec();
        self.head += take;
        Ok(bytes)
    }

    /// 读取对端当前已经发出的全部数据。
    ///
    /// 流结束，或在 `idle` 时间内没有新数据到达，即视为没有更多可用数据。
    pub async fn read_available(&mut self, idle: Duration) -> io::Result<Vec<u8>> {
        loop {
            match tokio::time::timeout(idle, self.fill()).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }
        let bytes = self.buf[self.head..self.tail].to_vec();
        self.head = self.tail;
        Ok(bytes)
    }

    /// 取回底层读取器
    pub fn into_inner(self) -> R {
        self.reader
    }
}
