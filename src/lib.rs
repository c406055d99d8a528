// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod binder;
pub mod cache;
pub mod config;
pub mod cookie;
pub mod cursor;
pub mod exception;
pub mod invoker;
pub mod multipart;
pub mod param;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod session;
pub mod util;

pub use binder::{DefaultBinder, JsonCodec, ParameterBinder, SerdeJsonCodec};
pub use cache::FileCache;
pub use config::Config;
pub use cookie::Cookie;
pub use exception::Exception;
pub use invoker::{Arg, ExceptionMapper, Interceptor, Invocation};
pub use multipart::{FileField, MultipartFile};
pub use param::HttpRequestMethod;
pub use request::{Request, RequestKind};
pub use response::Response;
pub use route::{HandlerFault, ParamSpec, ParamType, Reply, Route, RouteTable};
pub use router::{RouteOutcome, Router};
pub use server::Server;
pub use session::{SessionHandle, SessionStore};
pub use util::HtmlBuilder;
