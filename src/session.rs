// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话管理
//!
//! `SessionStore` 是进程内唯一的会话表，由服务器显式创建并传递给每个连接任务。
//! 会话的创建、查询、访问时间刷新与后台清扫共用同一把锁。
//!
//! 会话状态：`Active` →（每次访问刷新最后访问时间）→ `Active` →（空闲超过超时时间，
//! 或被显式注销）→ 移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{param::SESSION_COOKIE, request::Request};

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created: DateTime<Utc>,
    last_access: DateTime<Utc>,
    /// 空闲超时，单位为秒
    timeout: u64,
    attributes: HashMap<String, Value>,
}

impl Session {
    fn new(timeout: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            created: now,
            last_access: now,
            timeout,
            attributes: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    /// 空闲时间严格大于超时时间即视为过期。超出可表示范围的超时时间视为永不过期。
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match i64::try_from(self.timeout).ok().and_then(Duration::try_seconds) {
            Some(timeout) => now.signed_duration_since(self.last_access) > timeout,
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    default_timeout: u64,
}

impl SessionStore {
    pub fn new(default_timeout: u64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            default_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("会话表锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 创建并登记一个新会话
    pub fn create(&self) -> SessionHandle {
        let session = Session::new(self.default_timeout);
        let id = session.id.clone();
        self.lock().insert(id.clone(), session);
        debug!("创建会话{}", id);
        SessionHandle {
            id,
            store: self.clone(),
            is_new: true,
        }
    }

    /// 查找会话并刷新其最后访问时间。已过期但尚未被清扫的会话视为不存在。
    pub fn lookup(&self, id: &str) -> Option<SessionHandle> {
        let now = Utc::now();
        let mut sessions = self.lock();
        let expired = match sessions.get_mut(id) {
            Some(session) if !session.is_expired(now) => {
                session.last_access = now;
                false
            }
            Some(_) => true,
            None => return None,
        };
        if expired {
            sessions.remove(id);
            debug!("会话{}已过期", id);
            return None;
        }
        Some(SessionHandle {
            id: id.to_string(),
            store: self.clone(),
            is_new: false,
        })
    }

    /// 根据请求携带的会话 Cookie 查找会话。无法识别的会话标识不被信任。
    pub fn resolve(&self, request: &Request) -> Option<SessionHandle> {
        let cookie = request.cookie(SESSION_COOKIE)?;
        let handle = self.lookup(cookie.value());
        if handle.is_none() {
            debug!("丢弃无法识别的会话标识{}", cookie.value());
        }
        handle
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// 注销会话，返回会话之前是否存在
    pub fn invalidate(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 在持有锁的情况下访问会话
    pub fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.lock().get_mut(id).map(f)
    }

    /// 清扫过期会话，返回移除的数量
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    /// 启动后台清扫任务，按固定间隔运行
    pub fn spawn_sweeper(&self, interval: StdDuration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即完成
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    info!("会话清扫完成，移除{}个过期会话，剩余{}个", removed, store.len());
                }
            }
        })
    }
}

/// 交给处理器使用的会话句柄。所有读写都经过会话表的锁。
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    store: SessionStore,
    is_new: bool,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 本次请求中新创建的会话
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.store
            .with_session(&self.id, |s| s.attributes.get(name).cloned())
            .flatten()
    }

    /// 设置属性。会话已失效时返回 `false`。
    pub fn set(&self, name: &str, value: Value) -> bool {
        self.store
            .with_session(&self.id, |s| {
                s.attributes.insert(name.to_string(), value);
            })
            .is_some()
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.store
            .with_session(&self.id, |s| s.attributes.remove(name))
            .flatten()
    }

    pub fn set_timeout(&self, seconds: u64) -> bool {
        self.store
            .with_session(&self.id, |s| s.timeout = seconds)
            .is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.store.contains(&self.id)
    }

    pub fn invalidate(&self) -> bool {
        self.store.invalidate(&self.id)
    }
}
