// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, info, warn};
use std::env;
use std::fs::File;
use std::io::prelude::*;

/// 端口的环境变量覆盖，按顺序查找
const PORT_ENV_VARS: [&str; 2] = ["WEBENGINE_PORT", "PORT"];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    www_root: String,
    port: u16,
    worker_threads: usize,
    #[serde(default)]
    max_connections: usize,
    cache_size: usize,
    local: bool,
    #[serde(default = "default_static_prefix")]
    static_prefix: String,
    #[serde(default = "default_index_file")]
    index_file: String,
    #[serde(default = "default_favicon")]
    favicon: String,
    #[serde(default = "default_session_timeout")]
    session_timeout: u64,
    #[serde(default = "default_session_sweep_interval")]
    session_sweep_interval: u64,
    #[serde(default = "default_max_header_size")]
    max_header_size: usize,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    #[serde(default = "default_read_timeout")]
    read_timeout: u64,
    #[serde(default = "default_body_idle_timeout_ms")]
    body_idle_timeout_ms: u64,
    #[serde(default)]
    keystore_path: Option<String>,
    #[serde(default)]
    keystore_password: Option<String>,
    #[serde(default)]
    behind_tls: bool,
}

fn default_static_prefix() -> String {
    "/resources".to_string()
}

fn default_index_file() -> String {
    "static/index.html".to_string()
}

fn default_favicon() -> String {
    "static/favicon.ico".to_string()
}

fn default_session_timeout() -> u64 {
    1800 // 30分钟
}

fn default_session_sweep_interval() -> u64 {
    60
}

fn default_max_header_size() -> usize {
    65536 // 64KB
}

fn default_max_body_size() -> usize {
    16777216 // 16MB
}

fn default_read_timeout() -> u64 {
    30
}

fn default_body_idle_timeout_ms() -> u64 {
    50
}

impl Config {
    pub fn new() -> Self {
        let mut config = Self {
            www_root: ".".to_string(),
            port: 7878,
            worker_threads: 0,
            max_connections: 0,
            cache_size: 5,
            local: true,
            static_prefix: default_static_prefix(),
            index_file: default_index_file(),
            favicon: default_favicon(),
            session_timeout: default_session_timeout(),
            session_sweep_interval: default_session_sweep_interval(),
            max_header_size: default_max_header_size(),
            max_body_size: default_max_body_size(),
            read_timeout: default_read_timeout(),
            body_idle_timeout_ms: default_body_idle_timeout_ms(),
            keystore_path: None,
            keystore_password: None,
            behind_tls: false,
        };
        config.normalize();
        config
    }

    /// 从 TOML 文件加载配置。文件缺失或格式错误时退回默认配置。
    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}：{}，使用默认配置", filename, e);
                return Config::new().with_env_overrides();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}失败：{}，使用默认配置", filename, e);
            return Config::new().with_env_overrides();
        }
        Self::from_toml_str(&str_val).with_env_overrides()
    }

    /// 从 TOML 文本构建配置，不读取环境变量
    pub fn from_toml_str(text: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(text) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        raw_config.normalize();
        raw_config
    }

    fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.max_connections == 0 {
            self.max_connections = self.worker_threads * 64;
        }
        if self.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为5。");
            self.cache_size = 5;
        }
        if self.session_sweep_interval == 0 {
            warn!("session_sweep_interval不能为0，已改为60秒");
            self.session_sweep_interval = default_session_sweep_interval();
        }
        self.static_prefix = self.static_prefix.to_lowercase();
        if !self.static_prefix.starts_with('/') {
            self.static_prefix.insert(0, '/');
        }
        while self.static_prefix.len() > 1 && self.static_prefix.ends_with('/') {
            self.static_prefix.pop();
        }
    }

    /// 环境变量中的端口优先于配置文件
    pub fn with_env_overrides(mut self) -> Self {
        for var in PORT_ENV_VARS {
            if let Ok(value) = env::var(var) {
                match value.trim().parse::<u16>() {
                    Ok(port) => {
                        info!("环境变量{}覆盖了配置中的端口：{}", var, port);
                        self.port = port;
                        break;
                    }
                    Err(_) => warn!("环境变量{}的值{}不是合法端口，已忽略", var, value),
                }
            }
        }
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_www_root(mut self, root: &str) -> Self {
        self.www_root = root.to_string();
        self
    }

    pub fn with_index_file(mut self, path: &str) -> Self {
        self.index_file = path.to_string();
        self
    }

    pub fn with_favicon(mut self, path: &str) -> Self {
        self.favicon = path.to_string();
        self
    }

    pub fn with_behind_tls(mut self, behind_tls: bool) -> Self {
        self.behind_tls = behind_tls;
        self
    }

    pub fn with_read_timeout(mut self, seconds: u64) -> Self {
        self.read_timeout = seconds;
        self
    }

    pub fn with_session_timeout(mut self, seconds: u64) -> Self {
        self.session_timeout = seconds;
        self
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }

    pub fn index_file(&self) -> &str {
        &self.index_file
    }

    pub fn favicon(&self) -> &str {
        &self.favicon
    }

    pub fn session_timeout(&self) -> u64 {
        self.session_timeout
    }

    pub fn session_sweep_interval(&self) -> u64 {
        self.session_sweep_interval
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn read_timeout(&self) -> u64 {
        self.read_timeout
    }

    pub fn body_idle_timeout_ms(&self) -> u64 {
        self.body_idle_timeout_ms
    }

    /// TLS 握手由外部套接字工厂完成，这里只保存其所需的密钥库信息
    pub fn keystore(&self) -> Option<(&str, &str)> {
        match (&self.keystore_path, &self.keystore_password) {
            (Some(path), Some(password)) => Some((path.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn behind_tls(&self) -> bool {
        self.behind_tls || self.keystore().is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
