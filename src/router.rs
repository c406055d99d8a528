// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由引擎
//!
//! 把请求路径与方法匹配到路由表中的一条路由。
//!
//! ## 匹配规则：
//! 1. 先按登记顺序检查所有字面路由，再检查带 `{name}` 变量的模板路由，先匹配者胜出。
//! 2. 请求路径先按路由所在组的前缀切分一次，剩余部分再与方法级子路径比较。
//! 3. `HEAD` 请求可以匹配声明为 `GET` 的路由。
//! 4. `OPTIONS` 请求不会匹配任何路由，而是收集所有路径匹配的路由方法，写入响应的 `Allow` 集合。
//! 5. 路径存在但方法不符时报告 405，与路径不存在的 404 区分。

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::{
    param::HttpRequestMethod,
    request::Request,
    response::Response,
    route::{is_variable, Route, RouteTable},
};

/// 一次成功的匹配：路由加上提取出的路径变量
#[derive(Debug)]
pub struct RouteMatch<'a> {
    route: &'a Route,
    variables: HashMap<String, String>,
}

impl<'a> RouteMatch<'a> {
    pub fn route(&self) -> &'a Route {
        self.route
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}

#[derive(Debug)]
pub enum RouteOutcome<'a> {
    Matched(RouteMatch<'a>),
    /// `OPTIONS` 探测，允许的方法已写入响应
    Options,
    MethodNotAllowed,
    NotFound,
}

#[derive(Clone)]
pub struct Router {
    table: Arc<RouteTable>,
}

/// 按组前缀切分请求路径。前缀必须在段边界上结束。
fn strip_base<'p>(path: &'p str, base: &str) -> Option<&'p str> {
    if base.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// 比较模板与路径，成功时返回绑定的路径变量
pub fn match_path(template: &str, path: &str) -> Option<HashMap<String, String>> {
    if !template.contains('{') {
        return if template == path {
            Some(HashMap::new())
        } else {
            None
        };
    }
    let template_segments: Vec<&str> = template.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if template_segments.len() != path_segments.len() {
        return None;
    }
    let mut variables = HashMap::new();
    for (t, p) in template_segments.iter().zip(path_segments.iter()) {
        if is_variable(t) {
            if p.is_empty() {
                return None;
            }
            variables.insert(t[1..t.len() - 1].to_string(), p.to_string());
        } else if t != p {
            return None;
        }
    }
    Some(variables)
}

fn method_matches(declared: HttpRequestMethod, requested: HttpRequestMethod) -> bool {
    declared == requested
        || (requested == HttpRequestMethod::Head && declared == HttpRequestMethod::Get)
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// 为请求寻找路由。匹配成功时把路由的内容类型写入响应。
    pub fn resolve(&self, request: &Request, response: &mut Response) -> RouteOutcome<'_> {
        let path = request.path();
        let method = request.method();
        // 每个组前缀只切分一次
        let mut stripped: HashMap<&str, Option<&str>> = HashMap::new();
        let mut path_exists = false;

        let literal = self.table.routes().iter().filter(|r| !r.has_variables());
        let templated = self.table.routes().iter().filter(|r| r.has_variables());
        for route in literal.chain(templated) {
            let rest = *stripped
                .entry(route.base())
                .or_insert_with(|| strip_base(path, route.base()));
            let rest = match rest {
                Some(r) => r,
                None => continue,
            };
            let variables = match match_path(route.sub_path(), rest) {
                Some(v) => v,
                None => continue,
            };
            path_exists = true;

            if method == HttpRequestMethod::Options {
                response.allow(route.method());
                continue;
            }
            if method_matches(route.method(), method) {
                debug!("路由匹配成功：{} {} -> {:?}", method, path, route);
                response.set_content_type(route.content_type());
                return RouteOutcome::Matched(RouteMatch { route, variables });
            }
        }

        if method == HttpRequestMethod::Options {
            return if response.allowed().is_empty() {
                RouteOutcome::NotFound
            } else {
                RouteOutcome::Options
            };
        }
        if path_exists {
            RouteOutcome::MethodNotAllowed
        } else {
            RouteOutcome::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        invoker::Invocation,
        param::CONTENT_TYPE_JSON,
        route::{HandlerFault, Reply},
    };

    fn noop(_: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
        Ok(Reply::Empty)
    }

    /// 用内容类型给路由打标记，以便断言匹配到了哪一条
    fn tagged(method: HttpRequestMethod, path: &str, tag: &str) -> Route {
        Route::new(method, path, noop).produces(tag)
    }

    async fn request(raw: &str) -> Request {
        Request::from_bytes(raw.as_bytes(), 0).await.unwrap().unwrap()
    }

    fn resolve_tag(router: &Router, req: &Request) -> Option<String> {
        let mut response = Response::for_request(req);
        match router.resolve(req, &mut response) {
            RouteOutcome::Matched(m) => Some(m.route().content_type().to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_match_path() {
        let vars = match_path("/users/{id}", "/users/42").unwrap();
        assert_eq!(vars.get("id").unwrap(), "42");
        assert!(match_path("/users/{id}", "/users/42/posts").is_none());
        assert!(match_path("/users/{id}", "/users").is_none());
        assert!(match_path("/users/{id}", "/users/").is_none());
        assert!(match_path("/users", "/users").unwrap().is_empty());
        assert!(match_path("/users", "/user").is_none());
        let vars = match_path("/a/{x}/b/{y}", "/a/1/b/2").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("y").unwrap(), "2");
    }

    #[test]
    fn test_strip_base() {
        assert_eq!(strip_base("/users/42", "/users"), Some("/42"));
        assert_eq!(strip_base("/users", "/users"), Some("/"));
        assert_eq!(strip_base("/usersx", "/users"), None);
        assert_eq!(strip_base("/x", ""), Some("/x"));
    }

    #[tokio::test]
    async fn test_template_route_binds_variable() {
        let router = Router::new(RouteTable::builder().add(Route::get("/users/{id}", noop)).build());
        let req = request("GET /users/42 HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        match router.resolve(&req, &mut response) {
            RouteOutcome::Matched(m) => assert_eq!(m.variables().get("id").unwrap(), "42"),
            other => panic!("unexpected {:?}", other),
        }

        let req = request("GET /users/42/posts HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_head_matches_get_route() {
        let router = Router::new(RouteTable::builder().add(Route::get("/users/{id}", noop)).build());
        let req = request("HEAD /users/42 HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::Matched(_)));
    }

    #[tokio::test]
    async fn test_options_collects_allowed_methods() {
        let router = Router::new(
            RouteTable::builder()
                .add(Route::get("/x", noop))
                .add(Route::post("/x", noop))
                .add(Route::put("/y", noop))
                .build(),
        );
        let req = request("OPTIONS /x HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::Options));
        assert_eq!(
            response.allowed(),
            &[HttpRequestMethod::Get, HttpRequestMethod::Post]
        );

        let req = request("OPTIONS /nothing HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_method_mismatch_is_405() {
        let router = Router::new(RouteTable::builder().add(Route::get("/x", noop)).build());
        let req = request("DELETE /x HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::MethodNotAllowed));
    }

    #[tokio::test]
    async fn test_literal_routes_take_precedence() {
        let router = Router::new(
            RouteTable::builder()
                .add(tagged(HttpRequestMethod::Get, "/users/{id}", "template"))
                .add(tagged(HttpRequestMethod::Get, "/users/me", "literal"))
                .build(),
        );
        let req = request("GET /users/me HTTP/1.1\r\n\r\n").await;
        assert_eq!(resolve_tag(&router, &req).as_deref(), Some("literal"));
        let req = request("GET /users/7 HTTP/1.1\r\n\r\n").await;
        assert_eq!(resolve_tag(&router, &req).as_deref(), Some("template"));
    }

    #[tokio::test]
    async fn test_first_declared_wins() {
        let router = Router::new(
            RouteTable::builder()
                .add(tagged(HttpRequestMethod::Get, "/dup", "first"))
                .add(tagged(HttpRequestMethod::Get, "/dup", "second"))
                .build(),
        );
        let req = request("GET /dup HTTP/1.1\r\n\r\n").await;
        assert_eq!(resolve_tag(&router, &req).as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_group_routes_and_rest_content_type() {
        let router = Router::new(
            RouteTable::builder()
                .group("/api", |g| {
                    g.add(Route::get("/items/{id}", noop).rest())
                        .add(Route::get("", noop).produces("text/plain"))
                })
                .build(),
        );
        let req = request("GET /api/items/3 HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::Matched(_)));
        assert_eq!(response.content_type(), CONTENT_TYPE_JSON);

        let req = request("GET /api HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::Matched(_)));
        assert_eq!(response.content_type(), "text/plain");

        let req = request("GET /apiary HTTP/1.1\r\n\r\n").await;
        let mut response = Response::for_request(&req);
        assert!(matches!(router.resolve(&req, &mut response), RouteOutcome::NotFound));
    }
}
