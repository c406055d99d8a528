// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use bytes::Bytes;
use log::{debug, warn};
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

/// 静态文件缓存，以路径和修改时间作为有效性依据
pub struct FileCache {
    cache: LruCache<String, CacheEntry>,
}

pub type SharedCache = Arc<Mutex<FileCache>>;

impl FileCache {
    // 容量为0时按1处理
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn shared(capacity: usize) -> SharedCache {
        Arc::new(Mutex::new(Self::from_capacity(capacity)))
    }

    // 放入
    pub fn push(&mut self, filename: &str, bytes: Bytes, modified_time: SystemTime) {
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(filename.to_string(), entry);
    }

    // 查询有效缓存
    pub fn find(&mut self, filename: &str, current_modified_time: SystemTime) -> Option<&Bytes> {
        match self.cache.get(filename) {
            Some(entry) if entry.modified_time == current_modified_time => Some(&entry.content),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

fn lock(cache: &SharedCache) -> MutexGuard<'_, FileCache> {
    match cache.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("文件缓存锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

/// 完整读取一个普通文件。修改时间未变时直接使用缓存内容。
pub fn load(cache: &SharedCache, path: &Path) -> io::Result<Bytes> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "不是普通文件"));
    }
    let modified = metadata.modified()?;
    let key = path.to_string_lossy();

    if let Some(bytes) = lock(cache).find(&key, modified) {
        debug!("缓存命中：{}", key);
        return Ok(bytes.clone());
    }

    let bytes = Bytes::from(fs::read(path)?);
    lock(cache).push(&key, bytes.clone(), modified);
    Ok(bytes)
}
