// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表
//!
//! 路由在启动时通过构建器显式登记，每条路由是一条普通数据记录加一个回调函数，
//! 分发时不需要任何运行时类型检查。登记顺序即匹配顺序。
//!
//! ```ignore
//! let table = RouteTable::builder()
//!     .add(Route::get("/", index))
//!     .group("/users", |g| {
//!         g.add(Route::get("/{id}", show_user).rest().param(ParamSpec::value("id", ParamType::Int)))
//!     })
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::{invoker::Invocation, param::*};

/// 处理器的返回值
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 以 JSON 编码写出
    Json(Value),
    /// 视图：内容类型为 JSON 时按字面文本写出，否则视为静态资源路径
    View(String),
    /// 不写出响应体，状态码与标头保持处理器设置的值
    Empty,
}

/// 处理器执行失败
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFault(pub String);

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HandlerFault {
    fn from(s: &str) -> Self {
        HandlerFault(s.to_string())
    }
}

impl From<String> for HandlerFault {
    fn from(s: String) -> Self {
        HandlerFault(s)
    }
}

pub type Callback =
    Arc<dyn Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync>;

/// 参数的目标类型
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    /// 自定义对象，名称仅用于日志
    Object(String),
}

/// 处理器声明的参数，按声明顺序绑定
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    /// 当前请求
    Request,
    /// 正在构建的响应
    Response,
    /// 当前会话，不存在时新建
    Session,
    /// 整个 JSON 请求体
    Json,
    /// 按名称从参数表中取值
    Value {
        name: String,
        ty: ParamType,
        default: Option<String>,
    },
}

impl ParamSpec {
    pub fn value(name: &str, ty: ParamType) -> Self {
        ParamSpec::Value {
            name: name.to_string(),
            ty,
            default: None,
        }
    }

    pub fn value_or(name: &str, ty: ParamType, default: &str) -> Self {
        ParamSpec::Value {
            name: name.to_string(),
            ty,
            default: Some(default.to_string()),
        }
    }

    pub fn object(name: &str, type_name: &str) -> Self {
        Self::value(name, ParamType::Object(type_name.to_string()))
    }
}

#[derive(Clone)]
pub struct Route {
    method: HttpRequestMethod,
    base: String,
    sub: String,
    content_type: String,
    rest: bool,
    params: Vec<ParamSpec>,
    callback: Callback,
}

/// 统一路径模板：字面段小写，去掉结尾的 `/`，变量段保持原样
fn normalize_template(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_variable(s) {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        })
        .collect();
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    }
}

pub(crate) fn is_variable(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

impl Route {
    pub fn new<F>(method: HttpRequestMethod, path: &str, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync + 'static,
    {
        Self {
            method,
            base: String::new(),
            sub: normalize_template(path),
            content_type: CONTENT_TYPE_HTML.to_string(),
            rest: false,
            params: Vec::new(),
            callback: Arc::new(callback),
        }
    }

    pub fn get<F>(path: &str, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync + 'static,
    {
        Self::new(HttpRequestMethod::Get, path, callback)
    }

    pub fn post<F>(path: &str, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync + 'static,
    {
        Self::new(HttpRequestMethod::Post, path, callback)
    }

    pub fn put<F>(path: &str, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync + 'static,
    {
        Self::new(HttpRequestMethod::Put, path, callback)
    }

    pub fn delete<F>(path: &str, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Reply, HandlerFault> + Send + Sync + 'static,
    {
        Self::new(HttpRequestMethod::Delete, path, callback)
    }

    /// 声明产出的内容类型
    pub fn produces(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// REST 路由总是以 JSON 响应
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    fn with_base(mut self, base: &str) -> Self {
        self.base = normalize_template(base);
        self
    }
}

impl Route {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 处理器组的公共前缀，没有分组时为空
    pub fn base(&self) -> &str {
        &self.base
    }

    /// 方法级的子路径，已去掉组前缀，空表示组根路径
    pub fn sub_path(&self) -> &str {
        if self.sub.is_empty() {
            "/"
        } else {
            &self.sub
        }
    }

    /// 完整路径模板
    pub fn template(&self) -> String {
        match (self.base.is_empty(), self.sub.is_empty()) {
            (true, true) => "/".to_string(),
            (false, true) => self.base.clone(),
            _ => format!("{}{}", self.base, self.sub),
        }
    }

    pub fn has_variables(&self) -> bool {
        self.sub.split('/').any(is_variable)
    }

    /// 最终响应的内容类型，REST 路由强制为 JSON
    pub fn content_type(&self) -> &str {
        if self.rest {
            CONTENT_TYPE_JSON
        } else {
            &self.content_type
        }
    }

    pub fn is_rest(&self) -> bool {
        self.rest
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template())
            .field("content_type", &self.content_type())
            .field("rest", &self.rest)
            .field("params", &self.params)
            .finish()
    }
}

/// 启动后只读的有序路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
}

impl RouteTableBuilder {
    pub fn add(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// 登记一组共享前缀的路由
    pub fn group<F>(mut self, base: &str, f: F) -> Self
    where
        F: FnOnce(GroupBuilder) -> GroupBuilder,
    {
        let group = f(GroupBuilder {
            base: base.to_string(),
            routes: Vec::new(),
        });
        self.routes.extend(group.routes);
        self
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
        }
    }
}

pub struct GroupBuilder {
    base: String,
    routes: Vec<Route>,
}

impl GroupBuilder {
    pub fn add(mut self, route: Route) -> Self {
        let route = route.with_base(&self.base);
        self.routes.push(route);
        self
    }
}
