// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 处理器调用
//!
//! 按路由声明的顺序绑定参数，依次执行拦截器的前置回调、处理器、逆序的后置回调。
//! 参数绑定失败在处理器运行之前返回 `BindingFault`；处理器的失败（包括 panic）
//! 在这里被捕获，转为 `HandlerFault`，不会影响其他连接。

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, warn};
use serde_json::Value;

use crate::{
    binder::{JsonCodec, ParameterBinder},
    cookie::Cookie,
    exception::Exception,
    param::SESSION_COOKIE,
    request::Request,
    response::Response,
    route::{HandlerFault, ParamSpec, ParamType, Reply},
    router::RouteMatch,
    session::{SessionHandle, SessionStore},
};

/// 拦截器。前置回调返回 `false` 时跳过处理器。
pub trait Interceptor: Send + Sync {
    fn pre_handle(&self, _request: &Request, _response: &mut Response) -> bool {
        true
    }

    fn post_handle(&self, _request: &Request, _response: &mut Response) {}
}

/// 把处理器失败映射为自定义的状态码与响应体
pub trait ExceptionMapper: Send + Sync {
    fn map(&self, fault: &HandlerFault) -> Option<(u16, String)>;
}

/// 已绑定的处理器参数
#[derive(Clone)]
pub enum Arg {
    Request,
    Response,
    Session(SessionHandle),
    Value(Value),
}

/// 处理器在一次调用中看到的全部上下文
pub struct Invocation<'a> {
    request: &'a Request,
    response: &'a mut Response,
    sessions: &'a SessionStore,
    session: Option<SessionHandle>,
    variables: &'a HashMap<String, String>,
    args: Vec<Arg>,
    codec: &'a dyn JsonCodec,
}

impl<'a> Invocation<'a> {
    pub fn new(
        request: &'a Request,
        response: &'a mut Response,
        sessions: &'a SessionStore,
        variables: &'a HashMap<String, String>,
        args: Vec<Arg>,
        codec: &'a dyn JsonCodec,
    ) -> Self {
        Self {
            request,
            response,
            sessions,
            session: None,
            variables,
            args,
            codec,
        }
    }

    fn with_session(mut self, session: Option<SessionHandle>) -> Self {
        self.session = session;
        self
    }

    pub fn request(&self) -> &Request {
        self.request
    }

    pub fn response(&mut self) -> &mut Response {
        self.response
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    /// 第 `index` 个参数的绑定值，不是值参数时返回 `None`
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.args.get(index) {
            Some(Arg::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// 路径变量优先，其次是请求参数
    pub fn param(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .map(String::as_str)
            .or_else(|| self.request.parameter(name))
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// 取得当前会话，不存在时创建并通过 Cookie 告知客户端
    pub fn session_or_create(&mut self) -> SessionHandle {
        if let Some(handle) = &self.session {
            if handle.is_valid() {
                return handle.clone();
            }
        }
        let handle = self.sessions.create();
        announce(self.response, &handle);
        self.session = Some(handle.clone());
        handle
    }

    pub fn codec(&self) -> &dyn JsonCodec {
        self.codec
    }
}

fn announce(response: &mut Response, session: &SessionHandle) {
    response.add_cookie(Cookie::new(SESSION_COOKIE, session.id()).with_http_only(true));
}

pub struct HandlerInvoker {
    binder: Arc<dyn ParameterBinder>,
    codec: Arc<dyn JsonCodec>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    sessions: SessionStore,
}

impl HandlerInvoker {
    pub fn new(
        binder: Arc<dyn ParameterBinder>,
        codec: Arc<dyn JsonCodec>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            binder,
            codec,
            interceptors,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn codec(&self) -> &dyn JsonCodec {
        self.codec.as_ref()
    }

    pub fn invoke(
        &self,
        route_match: &RouteMatch<'_>,
        request: &Request,
        response: &mut Response,
        id: u128,
    ) -> Result<Reply, Exception> {
        let mut passed = 0;
        let mut early = None;
        for interceptor in &self.interceptors {
            let pre = panic::catch_unwind(AssertUnwindSafe(|| {
                interceptor.pre_handle(request, response)
            }));
            match pre {
                Ok(true) => passed += 1,
                Ok(false) => {
                    debug!("[ID{}]拦截器拒绝了请求，跳过处理器", id);
                    early = Some(Ok(Reply::Empty));
                    break;
                }
                Err(_) => {
                    error!("[ID{}]拦截器前置回调发生panic", id);
                    let fault = Exception::HandlerFault("interceptor panicked".to_string());
                    early = Some(Err(fault));
                    break;
                }
            }
        }

        let result = match early {
            Some(result) => result,
            None => self.call(route_match, request, response, id),
        };

        for interceptor in self.interceptors[..passed].iter().rev() {
            let post = panic::catch_unwind(AssertUnwindSafe(|| {
                interceptor.post_handle(request, response)
            }));
            if post.is_err() {
                error!("[ID{}]拦截器后置回调发生panic", id);
            }
        }
        result
    }

    fn call(
        &self,
        route_match: &RouteMatch<'_>,
        request: &Request,
        response: &mut Response,
        id: u128,
    ) -> Result<Reply, Exception> {
        let route = route_match.route();
        let variables = route_match.variables();
        let mut session = self.sessions.resolve(request);

        let mut args = Vec::with_capacity(route.params().len());
        for spec in route.params() {
            let arg = match spec {
                ParamSpec::Request => Arg::Request,
                ParamSpec::Response => Arg::Response,
                ParamSpec::Session => {
                    let handle = match &session {
                        Some(handle) => handle.clone(),
                        None => {
                            let handle = self.sessions.create();
                            announce(response, &handle);
                            session = Some(handle.clone());
                            handle
                        }
                    };
                    Arg::Session(handle)
                }
                ParamSpec::Json => match request.json_body() {
                    Some(text) => {
                        Arg::Value(self.codec.decode(text, &ParamType::Object("json".to_string()))?)
                    }
                    None => Arg::Value(Value::Null),
                },
                ParamSpec::Value { name, ty, default } => {
                    let raw = variables
                        .get(name)
                        .map(String::as_str)
                        .or_else(|| request.parameter(name))
                        .or(default.as_deref());
                    let bound = match raw {
                        Some(raw) => self.binder.bind(raw, ty),
                        None => {
                            let mut merged = request.parameters().clone();
                            merged.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
                            self.binder.bind_object(&merged, ty)
                        }
                    };
                    match bound {
                        Ok(value) => Arg::Value(value),
                        Err(e) => {
                            warn!("[ID{}]参数{}绑定失败：{}", id, name, e);
                            return Err(e);
                        }
                    }
                }
            };
            args.push(arg);
        }

        let callback = route.callback().clone();
        let mut invocation = Invocation::new(
            request,
            response,
            &self.sessions,
            variables,
            args,
            self.codec.as_ref(),
        )
        .with_session(session);

        match panic::catch_unwind(AssertUnwindSafe(|| callback(&mut invocation))) {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(fault)) => {
                warn!("[ID{}]处理器返回错误：{}", id, fault);
                Err(Exception::HandlerFault(fault.0))
            }
            Err(_) => {
                error!("[ID{}]处理器发生panic", id);
                Err(Exception::HandlerFault("handler panicked".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binder::{DefaultBinder, MockJsonCodec, MockParameterBinder, SerdeJsonCodec},
        route::{Route, RouteTable},
        router::{RouteOutcome, Router},
    };
    use serde_json::json;
    use std::sync::Mutex;

    async fn request(raw: &str) -> Request {
        Request::from_bytes(raw.as_bytes(), 0).await.unwrap().unwrap()
    }

    fn invoker(interceptors: Vec<Arc<dyn Interceptor>>) -> HandlerInvoker {
        HandlerInvoker::new(
            Arc::new(DefaultBinder),
            Arc::new(SerdeJsonCodec),
            interceptors,
            SessionStore::new(1800),
        )
    }

    fn run(
        invoker: &HandlerInvoker,
        route: Route,
        req: &Request,
    ) -> (Result<Reply, Exception>, Response) {
        let router = Router::new(RouteTable::builder().add(route).build());
        let mut response = Response::for_request(req);
        let result = match router.resolve(req, &mut response) {
            RouteOutcome::Matched(m) => invoker.invoke(&m, req, &mut response, 0),
            other => panic!("route did not match: {:?}", other),
        };
        (result, response)
    }

    #[tokio::test]
    async fn test_binds_in_declaration_order() {
        let route = Route::post("/users/{id}", |inv: &mut Invocation<'_>| {
            assert!(matches!(inv.arg(0), Some(Arg::Request)));
            assert!(matches!(inv.arg(1), Some(Arg::Response)));
            Ok(Reply::Json(json!({
                "id": inv.value(2).cloned(),
                "age": inv.value(3).cloned(),
                "page": inv.value(4).cloned(),
                "raw": inv.variable("id"),
            })))
        })
        .rest()
        .param(ParamSpec::Request)
        .param(ParamSpec::Response)
        .param(ParamSpec::value("id", ParamType::Int))
        .param(ParamSpec::value("age", ParamType::Int))
        .param(ParamSpec::value_or("page", ParamType::Int, "1"));
        let req = request(
            "POST /users/42 HTTP/1.1\r\nContent-Length: 6\r\n\r\nage=30",
        )
        .await;
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(
            result.unwrap(),
            Reply::Json(json!({"id": 42, "age": 30, "page": 1, "raw": "42"}))
        );
    }

    #[tokio::test]
    async fn test_binding_fault_skips_handler() {
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let route = Route::post("/users", move |_inv: &mut Invocation<'_>| {
            *flag.lock().unwrap() = true;
            Ok(Reply::Empty)
        })
        .param(ParamSpec::value("age", ParamType::Int));
        let req = request(
            "POST /users HTTP/1.1\r\nContent-Length: 15\r\n\r\nname=abc&age=9x",
        )
        .await;
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(result.unwrap_err().status_code(), 400);
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_object_from_all_parameters() {
        let route = Route::post("/users", |inv: &mut Invocation<'_>| {
            Ok(Reply::Json(inv.value(0).cloned().unwrap_or(Value::Null)))
        })
        .param(ParamSpec::object("user", "User"));
        let req = request(
            "POST /users HTTP/1.1\r\nContent-Length: 14\r\n\r\nname=sam&age=9",
        )
        .await;
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(result.unwrap(), Reply::Json(json!({"name": "sam", "age": "9"})));
    }

    #[tokio::test]
    async fn test_json_body_argument() {
        let route = Route::post("/items", |inv: &mut Invocation<'_>| {
            Ok(Reply::Json(inv.value(0).cloned().unwrap_or(Value::Null)))
        })
        .param(ParamSpec::Json);
        let body = r#"{"a":1}"#;
        let raw = format!(
            "POST /items HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = request(&raw).await;
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(result.unwrap(), Reply::Json(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_session_created_and_announced() {
        let invoker = invoker(Vec::new());
        let route = Route::get("/me", |inv: &mut Invocation<'_>| match inv.arg(0) {
            Some(Arg::Session(s)) => {
                s.set("visits", json!(1));
                Ok(Reply::Empty)
            }
            _ => Err(HandlerFault::from("no session")),
        })
        .param(ParamSpec::Session);

        let req = request("GET /me HTTP/1.1\r\nCookie: sessionId=forged\r\n\r\n").await;
        let (result, response) = run(&invoker, route.clone(), &req);
        assert_eq!(result.unwrap(), Reply::Empty);
        assert_eq!(invoker.sessions().len(), 1);
        let cookie = &response.cookies()[0];
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_ne!(cookie.value(), "forged");
        assert!(cookie.http_only());

        // 已存在的会话不会再次下发 Cookie
        let raw = format!("GET /me HTTP/1.1\r\nCookie: sessionId={}\r\n\r\n", cookie.value());
        let req = request(&raw).await;
        let (_, response) = run(&invoker, route, &req);
        assert!(response.cookies().is_empty());
        assert_eq!(invoker.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_fault_and_panic_are_caught() {
        let req = request("GET /boom HTTP/1.1\r\n\r\n").await;
        let route = Route::get("/boom", |_inv: &mut Invocation<'_>| {
            Err(HandlerFault::from("bad things"))
        });
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(result, Err(Exception::HandlerFault("bad things".to_string())));

        let route = Route::get("/boom", |_inv: &mut Invocation<'_>| -> Result<Reply, HandlerFault> {
            panic!("kaboom")
        });
        let (result, _) = run(&invoker(Vec::new()), route, &req);
        assert_eq!(result.unwrap_err().status_code(), 500);
    }

    struct Recorder {
        name: &'static str,
        allow: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recorder {
        fn pre_handle(&self, _request: &Request, _response: &mut Response) -> bool {
            self.log.lock().unwrap().push(format!("pre:{}", self.name));
            self.allow
        }

        fn post_handle(&self, _request: &Request, response: &mut Response) {
            self.log.lock().unwrap().push(format!("post:{}", self.name));
            response.add_header("X-Seen", self.name);
        }
    }

    #[tokio::test]
    async fn test_interceptor_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", allow: true, log: Arc::clone(&log) }),
            Arc::new(Recorder { name: "b", allow: true, log: Arc::clone(&log) }),
        ];
        let route = Route::get("/x", move |_inv: &mut Invocation<'_>| {
            handler_log.lock().unwrap().push("handler".to_string());
            Err(HandlerFault::from("fails anyway"))
        });
        let req = request("GET /x HTTP/1.1\r\n\r\n").await;
        let (result, response) = run(&invoker(interceptors), route, &req);
        assert!(result.is_err());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre:a", "pre:b", "handler", "post:b", "post:a"]
        );
        assert_eq!(response.header("X-Seen"), Some("b"));
    }

    #[tokio::test]
    async fn test_interceptor_veto() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", allow: true, log: Arc::clone(&log) }),
            Arc::new(Recorder { name: "b", allow: false, log: Arc::clone(&log) }),
        ];
        let route = Route::get("/x", |_inv: &mut Invocation<'_>| Ok(Reply::View("/x.html".into())));
        let req = request("GET /x HTTP/1.1\r\n\r\n").await;
        let (result, _) = run(&invoker(interceptors), route, &req);
        assert_eq!(result.unwrap(), Reply::Empty);
        assert_eq!(*log.lock().unwrap(), vec!["pre:a", "pre:b", "post:a"]);
    }

    struct Exploding {
        in_pre: bool,
    }

    impl Interceptor for Exploding {
        fn pre_handle(&self, _request: &Request, _response: &mut Response) -> bool {
            if self.in_pre {
                panic!("pre exploded");
            }
            true
        }

        fn post_handle(&self, _request: &Request, _response: &mut Response) {
            panic!("post exploded");
        }
    }

    #[tokio::test]
    async fn test_interceptor_panic_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", allow: true, log: Arc::clone(&log) }),
            Arc::new(Exploding { in_pre: true }),
        ];
        let route = Route::get("/x", move |_inv: &mut Invocation<'_>| {
            handler_log.lock().unwrap().push("handler".to_string());
            Ok(Reply::Empty)
        });
        let req = request("GET /x HTTP/1.1\r\n\r\n").await;
        let (result, _) = run(&invoker(interceptors), route.clone(), &req);
        assert_eq!(result.unwrap_err().status_code(), 500);
        assert_eq!(*log.lock().unwrap(), vec!["pre:a", "post:a"]);

        log.lock().unwrap().clear();
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", allow: true, log: Arc::clone(&log) }),
            Arc::new(Exploding { in_pre: false }),
        ];
        let (result, _) = run(&invoker(interceptors), route, &req);
        assert_eq!(result.unwrap(), Reply::Empty);
        assert_eq!(*log.lock().unwrap(), vec!["pre:a", "handler", "post:a"]);
    }

    #[tokio::test]
    async fn test_uses_injected_binder_and_codec() {
        let mut binder = MockParameterBinder::new();
        binder
            .expect_bind()
            .withf(|raw, ty| raw == "7" && *ty == ParamType::Int)
            .times(1)
            .returning(|_, _| Ok(json!(700)));
        let mut codec = MockJsonCodec::new();
        codec
            .expect_decode()
            .times(1)
            .returning(|_, _| Ok(json!({"decoded": true})));

        let invoker = HandlerInvoker::new(
            Arc::new(binder),
            Arc::new(codec),
            Vec::new(),
            SessionStore::new(1800),
        );
        let route = Route::post("/n/{n}", |inv: &mut Invocation<'_>| {
            Ok(Reply::Json(json!([inv.value(0).cloned(), inv.value(1).cloned()])))
        })
        .param(ParamSpec::value("n", ParamType::Int))
        .param(ParamSpec::Json);
        let raw = "POST /n/7 HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        let req = request(raw).await;
        let (result, _) = run(&invoker, route, &req);
        assert_eq!(result.unwrap(), Reply::Json(json!([700, {"decoded": true}])));
    }
}
