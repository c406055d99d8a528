// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器
//!
//! 持有监听套接字，循环接受连接，每个连接交给一个任务从头处理到尾：
//! 解析 → 路由（或图标、静态资源、首页的快捷路径）→ 调用处理器 → 写出响应 → 关闭。
//! 在途连接数由信号量限制，超出的连接留在监听队列中等待。

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::{Notify, Semaphore},
    time::timeout,
};

use crate::{
    binder::{DefaultBinder, JsonCodec, ParameterBinder, SerdeJsonCodec},
    cache::{FileCache, SharedCache},
    config::Config,
    cursor::ByteCursor,
    exception::Exception,
    invoker::{ExceptionMapper, HandlerInvoker, Interceptor},
    param::*,
    request::{ParseLimits, Request},
    response::Response,
    route::{HandlerFault, Reply, RouteTable},
    router::{RouteMatch, RouteOutcome, Router},
    session::SessionStore,
};

pub struct Server {
    config: Arc<Config>,
    router: Router,
    invoker: HandlerInvoker,
    mapper: Option<Arc<dyn ExceptionMapper>>,
    cache: SharedCache,
    sessions: SessionStore,
    limits: ParseLimits,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    active_connection: AtomicU32,
}

pub struct ServerBuilder {
    config: Config,
    routes: RouteTable,
    interceptors: Vec<Arc<dyn Interceptor>>,
    binder: Arc<dyn ParameterBinder>,
    codec: Arc<dyn JsonCodec>,
    mapper: Option<Arc<dyn ExceptionMapper>>,
}

impl ServerBuilder {
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn ParameterBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn JsonCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn exception_mapper(mut self, mapper: Arc<dyn ExceptionMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn build(self) -> Server {
        let sessions = SessionStore::new(self.config.session_timeout());
        let invoker =
            HandlerInvoker::new(self.binder, self.codec, self.interceptors, sessions.clone());
        info!("路由表已载入，共{}条路由", self.routes.len());
        Server {
            router: Router::new(self.routes),
            invoker,
            mapper: self.mapper,
            cache: FileCache::shared(self.config.cache_size()),
            sessions,
            limits: ParseLimits::from_config(&self.config),
            config: Arc::new(self.config),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            active_connection: AtomicU32::new(0),
        }
    }
}

/// 丢弃上限，超出后直接关闭
const DISCARD_LIMIT: usize = 1 << 20;

/// 关闭前读掉客户端尚未发完的数据
async fn discard_input<S: AsyncRead + Unpin>(stream: &mut S) {
    let mut buffer = [0u8; 8192];
    let mut total = 0;
    while total < DISCARD_LIMIT {
        match timeout(Duration::from_millis(100), stream.read(&mut buffer)).await {
            Ok(Ok(n)) if n > 0 => total += n,
            _ => break,
        }
    }
}

/// 活跃连接计数，任务结束（包括 panic 展开）时归还
struct ActiveConnection<'a>(&'a AtomicU32);

impl<'a> ActiveConnection<'a> {
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 路径是否位于某个前缀之下（按段边界）
fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl Server {
    pub fn builder(config: Config) -> ServerBuilder {
        ServerBuilder {
            config,
            routes: RouteTable::default(),
            interceptors: Vec::new(),
            binder: Arc::new(DefaultBinder),
            codec: Arc::new(SerdeJsonCodec),
            mapper: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connection.load(Ordering::SeqCst)
    }

    /// 发出停机信号，接受循环在下一次检查时退出，已接受的连接继续处理完
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// 按配置绑定监听地址：仅本地时为 127.0.0.1，否则为 0.0.0.0
    pub async fn bind(&self) -> Result<TcpListener, Exception> {
        let port = self.config.port();
        let address = match self.config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        info!("服务端将在{}:{}上监听Socket连接", address, port);
        if let Some((path, _)) = self.config.keystore() {
            info!("TLS由前置的传输层负责，证书库：{}", path);
        }
        let listener = TcpListener::bind(SocketAddrV4::new(address, port)).await?;
        info!("端口{}绑定完成", port);
        Ok(listener)
    }

    pub async fn run(self: Arc<Self>) -> Result<(), Exception> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// 接受循环。只在 `accept()` 和连接数上限处等待。
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), Exception> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections()));
        let sweeper = self
            .sessions
            .spawn_sweeper(Duration::from_secs(self.config.session_sweep_interval()));
        let mut id: u128 = 0;

        loop {
            if self.is_stopping() {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = self.shutdown_notify.notified() => continue,
            };
            let (stream, addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("接受连接时遇到错误：{}", e);
                        continue;
                    }
                },
                _ = self.shutdown_notify.notified() => continue,
            };
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let server = Arc::clone(&self);
            let connection_id = id;
            tokio::spawn(async move {
                let _active = ActiveConnection::enter(&server.active_connection);
                server.handle_connection(stream, connection_id).await;
                drop(permit);
            });
            id += 1;
        }

        sweeper.abort();
        Ok(())
    }

    /// 处理单个连接的完整生命周期
    pub async fn handle_connection<S>(&self, mut stream: S, id: u128)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let parsed = {
            let mut cursor = ByteCursor::new(&mut stream, self.limits.max_header_size);
            let parse = Request::parse(&mut cursor, &self.limits, id);
            match self.config.read_timeout() {
                0 => parse.await,
                secs => match timeout(Duration::from_secs(secs), parse).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("[ID{}]读取请求超时，关闭连接", id);
                        return;
                    }
                },
            }
        };

        let request = match parsed {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("[ID{}]不是HTTP请求，静默关闭连接", id);
                return;
            }
            Err(Exception::RequestTooLarge) => {
                warn!("[ID{}]请求超过尺寸上限，返回400", id);
                let response =
                    Response::from_status_code(HttpRequestMethod::Get, 400, None, id);
                if let Err(e) = response.flush(&mut stream).await {
                    error!("[ID{}]发送响应失败：{}", id, e);
                }
                let _ = stream.shutdown().await;
                discard_input(&mut stream).await;
                return;
            }
            Err(e) => {
                error!("[ID{}]解析HTTP请求失败：{}", id, e);
                return;
            }
        };
        debug!("[ID{}]成功解析HTTP请求", id);

        let start_time = Instant::now();
        let response = self.dispatch(&request, id);
        debug!(
            "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
            id,
            start_time.elapsed().as_millis()
        );

        info!(
            "[ID{}] {}, {}, {}, {}, {}, {}, ",
            id,
            request.protocol(),
            request.path(),
            request.method(),
            response.status_code(),
            response.information(),
            request.user_agent(),
        );

        if let Err(e) = response.flush(&mut stream).await {
            error!("[ID{}]发送响应失败：{}", id, e);
        }
        let _ = stream.shutdown().await;
    }

    /// 为一个已解析的请求构建响应
    pub fn dispatch(&self, request: &Request, id: u128) -> Response {
        let path = request.path();
        // 图标与静态资源只响应读取请求，其余方法交给路由表
        let is_read = matches!(
            request.method(),
            HttpRequestMethod::Get | HttpRequestMethod::Head
        );
        let is_favicon = path == FAVICON_PATH;
        let is_static = is_under(path, self.config.static_prefix());
        let mut response = if is_read && is_favicon {
            Response::favicon(request, &self.cache, &self.config, id)
        } else if is_read && is_static {
            Response::static_resource(request, &self.cache, &self.config, id)
        } else {
            let mut response = Response::for_request(request);
            if request.method() == HttpRequestMethod::Options && (is_favicon || is_static) {
                response
                    .allow(HttpRequestMethod::Get)
                    .allow(HttpRequestMethod::Head);
            }
            match self.router.resolve(request, &mut response) {
                RouteOutcome::Matched(route_match) => {
                    self.run_handler(&route_match, request, response, id)
                }
                RouteOutcome::Options => response.options(),
                RouteOutcome::MethodNotAllowed => {
                    warn!("[ID{}]路径{}不支持{}方法，返回405", id, path, request.method());
                    Response::method_not_allowed(request, id)
                }
                RouteOutcome::NotFound => self.fallback(request, id),
            }
        };
        response.set_secure(self.config.behind_tls());
        response
    }

    fn run_handler(
        &self,
        route_match: &RouteMatch<'_>,
        request: &Request,
        mut response: Response,
        id: u128,
    ) -> Response {
        let content_type = route_match.route().content_type();
        let reply = match self.invoker.invoke(route_match, request, &mut response, id) {
            Ok(reply) => reply,
            Err(e) => return self.fault(request, e, content_type, id),
        };
        let body = match reply {
            Reply::Json(value) => {
                response.set_content_type(CONTENT_TYPE_JSON);
                match self.invoker.codec().encode(&value) {
                    Ok(text) => text,
                    Err(e) => return self.fault(request, e, content_type, id),
                }
            }
            Reply::View(view) => view,
            Reply::Empty => return response,
        };
        let status = response.status_code();
        match response.execute(&body, status, &self.cache, &self.config) {
            Ok(()) => response,
            Err(e) => self.fault(request, e, content_type, id),
        }
    }

    /// 把处理过程中的异常转为响应
    fn fault(&self, request: &Request, e: Exception, content_type: &str, id: u128) -> Response {
        match e {
            Exception::BindingFault(msg) => {
                warn!("[ID{}]参数绑定失败：{}，返回400", id, msg);
                Response::bad_request(request, Some(&msg), id)
            }
            Exception::HandlerFault(msg) => {
                let fault = HandlerFault(msg);
                if let Some((status, body)) = self.mapper.as_ref().and_then(|m| m.map(&fault)) {
                    debug!("[ID{}]异常映射器接管了处理器错误，状态码{}", id, status);
                    let mut response = Response::for_request(request);
                    response
                        .set_status(status)
                        .set_content_type(content_type)
                        .set_body(Bytes::from(body));
                    return response;
                }
                error!("[ID{}]处理请求时发生异常：{}", id, fault);
                Response::internal_error(request, Some(&fault.0), id)
            }
            Exception::StaticResourceMissing | Exception::RouteNotFound => {
                warn!("[ID{}]请求的资源不存在，返回404", id);
                Response::not_found(request, id)
            }
            Exception::MethodNotAllowed => Response::method_not_allowed(request, id),
            other => {
                error!("[ID{}]处理请求时发生未知异常：{}", id, other);
                Response::internal_error(request, None, id)
            }
        }
    }

    /// 没有路由匹配时的兜底：根路径返回首页，其余 GET/HEAD 请求尝试根目录下的文件
    fn fallback(&self, request: &Request, id: u128) -> Response {
        match request.method() {
            HttpRequestMethod::Get | HttpRequestMethod::Head => {
                if request.path() == "/" {
                    return Response::index_file(request, &self.cache, &self.config, id);
                }
                match Response::from_www_root(request, &self.cache, &self.config, id) {
                    Some(response) => response,
                    None => {
                        warn!("[ID{}]请求的路径：{} 不存在，返回404", id, request.path());
                        Response::not_found(request, id)
                    }
                }
            }
            _ => {
                warn!("[ID{}]没有与{} {}匹配的路由，返回404", id, request.method(), request.path());
                Response::not_found(request, id)
            }
        }
    }
}
