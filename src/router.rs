//! Portfolio HTTP router module
//!
//! This module provides the routing and HTTP infrastructure for the site:
//!
//! - Method-, path- and parameter-based routing of HTTP endpoints
//! - Global and route-specific middleware (pre and post)
//! - A raw tokio accept loop with bounded request parsing
//! - Hot-reload of templates in debug mode via a websocket route and a file watcher
use crate::mail::Mailer;
use crate::orm::Db;
use crate::settings::Settings;
use axum::Router as AxumRouter;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::routing::get;
use notify::event::DataChange;
use notify::event::ModifyKind::Data;
use notify::{EventKind, RecursiveMode, Watcher};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Largest accepted request head (request line plus headers).
pub const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Settings,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Other(String),
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        }
    }

    /// Whether a route registered for `self` serves a request using `requested`.
    pub fn accepts(&self, requested: &Method) -> bool {
        self == requested || (*self == Method::Get && *requested == Method::Head)
    }
}

/// An incoming HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Path parameters extracted by the matched route.
    pub params: HashMap<String, String>,
}

impl Request {
    /// Build a request for `target`, which may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Request {
            method,
            path,
            query,
            headers: HashMap::new(),
            body: Vec::new(),
            params: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Non-empty query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Represents the outcome of an HTTP handler.
/// Supports HTML, JSON, and custom status/headers.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    fn with_status(status_code: u16, body: impl Into<String>) -> Self {
        Response {
            status_code,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 200 response with text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response::with_status(200, body)
    }

    /// Construct a new HTTP 200 response with an HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        Response::ok(body).with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// Construct a new HTTP 403 response with text body.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Response::with_status(403, body)
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response::with_status(404, "404 Not Found")
    }

    /// Construct a new HTTP 405 response.
    pub fn method_not_allowed() -> Self {
        Response::with_status(405, "405 Method Not Allowed")
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Response::with_status(400, body)
    }

    pub fn payload_too_large() -> Self {
        Response::with_status(413, "413 Payload Too Large")
    }

    pub fn server_error(body: impl Into<String>) -> Self {
        Response::with_status(500, body)
    }

    /// Drop the body but keep the length it would have had, as a HEAD reply.
    pub fn without_body(mut self) -> Self {
        let length = self.body.len().to_string();
        self.body.clear();
        self.with_header("Content-Length", &length)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(e) => {
                log::error!("Response serialization failed: {}", e);
                Response {
                    status_code: 500,
                    body: "{\"error\": \"Serialization failed\"}".to_string(),
                    headers,
                }
            }
        }
    }
}

/// Holds metadata about the current HTTP request and its extracted path parameters.
/// Middleware and handlers can modify/read this context.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub is_authenticated: bool,
    pub start_time: Option<Instant>,
}

impl RequestContext {
    pub fn for_request(request: &Request) -> Self {
        RequestContext {
            method: request.method.clone(),
            path: request.path.clone(),
            params: HashMap::new(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            is_authenticated: false,
            start_time: None,
        }
    }
}

/// Type alias for async handler functions for HTTP routes.
/// Accepts the request (with path parameters filled in) and the app state.
pub type Handler = Arc<
    dyn Fn(Request, AppState) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync,
>;

/// Type alias for synchronous, pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Type alias for post-processing middleware executed after the handler.
/// Post-middleware can inspect/modify the response before it is sent.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The main application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("connection closed before a full request was read")]
    Closed,
    #[error("malformed request")]
    Malformed,
    #[error("request too large")]
    TooLarge,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Decode a query-string component: `%XX` escapes, and `+` as space.
pub fn url_decode(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Parse `a=1&b=two` into a map; later duplicates win.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (url_decode(k), url_decode(v)),
            None => (url_decode(pair), String::new()),
        })
        .collect()
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (decode_path(path), parse_query(query)),
        None => (decode_path(target), HashMap::new()),
    }
}

/// Parse the request line and headers.
pub fn parse_head(head: &str) -> Result<Request, ReadError> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ReadError::Malformed)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(ReadError::Malformed)?;
    let target = parts.next().ok_or(ReadError::Malformed)?;
    if !parts.next().is_some_and(|v| v.starts_with("HTTP/")) {
        return Err(ReadError::Malformed);
    }

    let mut request = Request::new(Method::parse(method), target);
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(ReadError::Malformed)?;
        request
            .headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(request)
}

/// Read one request (head and `Content-Length` body) from the stream.
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Request, ReadError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ReadError::TooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ReadError::Malformed)?;
    let mut request = parse_head(head)?;
    let content_length = match request.header("content-length") {
        Some(v) => v.trim().parse::<usize>().map_err(|_| ReadError::Malformed)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(ReadError::TooLarge);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::Closed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;
    Ok(request)
}

/// Serializes a Response into raw HTTP/1.1 bytes.
/// An explicit `Content-Length` header (set for HEAD) wins over the body length.
pub fn serialize_response(response: &Response) -> Vec<u8> {
    let mut content_length = response.body.len().to_string();
    let mut headers = String::new();
    for (key, value) in &response.headers {
        if key.eq_ignore_ascii_case("content-length") {
            content_length = value.clone();
            continue;
        }
        headers.push_str(&format!("{}: {}\r\n", key, value));
    }

    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        response.status_code,
        status_text(response.status_code),
        content_length,
        headers,
        response.body
    )
    .into_bytes()
}

/// Sends an HTTP Response over a connection.
async fn send_response<W: AsyncWrite + Unpin>(socket: &mut W, response: Response) {
    if let Err(e) = socket.write_all(&serialize_response(&response)).await {
        log::debug!("Failed to write response: {}", e);
    }
    let _ = socket.shutdown().await;
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router::default()
    }

    /// Register an HTTP route with method, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        method: Method,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method,
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Run one request through middleware, the matching route, and post-middleware.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut ctx = RequestContext::for_request(&request);
        let mut response = self.handle(&mut ctx, request).await;
        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&ctx, response);
        }
        if ctx.method == Method::Head {
            response = response.without_body();
        }
        response
    }

    async fn handle(&self, ctx: &mut RequestContext, mut request: Request) -> Response {
        let Some(state) = self.app_state.clone() else {
            log::error!("App state not set in Router");
            return Response::server_error("App state not set");
        };

        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(ctx) {
                return response;
            }
        }

        let mut path_matched = false;
        for route in &self.routes {
            if let Some(params) = match_path(&route.path_pattern, &ctx.path) {
                path_matched = true;
                if !route.method.accepts(&ctx.method) {
                    continue;
                }
                ctx.params = params;

                for middleware in &route.middlewares {
                    if let Some(response) = (middleware)(ctx) {
                        return response;
                    }
                }
                request.params = ctx.params.clone();
                return (route.handler)(request, state).await;
            }
        }

        if path_matched {
            Response::method_not_allowed()
        } else {
            Response::not_found()
        }
    }

    /// Watches the template directory for changes; notifies via WS broadcast for live-reload.
    fn setup_ws_reload_watcher(&self, template_path: PathBuf, sender: broadcast::Sender<String>) {
        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(32);
            let mut watcher = match notify::recommended_watcher(move |res| {
                let _ = tx.blocking_send(res);
            }) {
                Ok(watcher) => watcher,
                Err(e) => {
                    log::error!("Failed to create template watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&template_path, RecursiveMode::Recursive) {
                log::error!("Failed to watch {}: {}", template_path.display(), e);
                return;
            }

            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        if let EventKind::Modify(Data(DataChange::Content)) = event.kind {
                            if let Some(file_name) = event
                                .paths
                                .first()
                                .and_then(|p| p.file_name())
                                .and_then(|n| n.to_str())
                            {
                                log::info!("📄 Template changed: {}", file_name);
                                let _ = sender.send("reload".to_string());
                            }
                        }
                    }
                    Err(e) => log::error!("Watch error: {:?}", e),
                }
            }
        });
    }

    /// Start the HTTP server, plus the live-reload socket when running in debug mode.
    ///
    /// This is the typical entry point for production use.
    pub async fn run(
        &self,
        settings: Settings,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let http_addr = format!("{}:{}", settings.host, settings.port);

        if settings.debug {
            let ws_self = self.clone();
            let ws_addr = format!("{}:{}", settings.host, settings.ws_port);
            let ws_settings = settings.clone();
            let ws_handle =
                tokio::spawn(async move { ws_self.run_ws(&ws_addr, ws_settings).await });
            self.run_http(&http_addr).await?;
            ws_handle.await??;
        } else {
            self.run_http(&http_addr).await?;
        }
        Ok(())
    }

    /// Start the HTTP server for page, form and admin endpoints.
    /// Uses a classic TcpListener and manual HTTP parsing for fine-grained control.
    pub async fn run_http(&self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.app_state.is_none() {
            return Err("App state not set in Router".into());
        }
        let listener = TcpListener::bind(addr).await?;
        log::info!("HTTP Server running on http://{}", addr);

        let router = Arc::new(self.clone());
        loop {
            let (mut socket, peer) = listener.accept().await?;
            let router = router.clone();
            tokio::spawn(async move {
                let response = match read_request(&mut socket).await {
                    Ok(request) => router.dispatch(request).await,
                    Err(ReadError::TooLarge) => Response::payload_too_large(),
                    Err(ReadError::Malformed) => Response::bad_request("400 Bad Request"),
                    Err(e) => {
                        log::debug!("Dropping connection from {}: {}", peer, e);
                        return;
                    }
                };
                send_response(&mut socket, response).await;
            });
        }
    }

    /// Build an Axum router serving the hot-reload websocket.
    /// Called only from run_ws().
    pub fn build_ws_axum_router(reload_sender: broadcast::Sender<String>) -> AxumRouter {
        AxumRouter::new().route(
            "/ws/reload",
            get(move |ws: WebSocketUpgrade| {
                let tx = reload_sender.clone();
                async move {
                    ws.on_upgrade(move |mut socket| async move {
                        let mut rx = tx.subscribe();
                        log::info!("🔌 Hot Reload WebSocket client connected!");
                        while let Ok(msg) = rx.recv().await {
                            if socket.send(Message::Text(msg.into())).await.is_err() {
                                break;
                            }
                        }
                    })
                }
            }),
        )
    }

    /// Start the live-reload WebSocket server and the template watcher feeding it.
    /// Uses Axum and Hyper for WebSocket protocol handling.
    pub async fn run_ws(
        &self,
        addr: &str,
        settings: Settings,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let template_path = PathBuf::from(&settings.template.dir);
        let (sender, _) = broadcast::channel::<String>(10);
        self.setup_ws_reload_watcher(template_path, sender.clone());

        let app = Self::build_ws_axum_router(sender);

        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        log::info!("Live reload WebSocket running at ws://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Box an `async fn(Request, AppState) -> Response` into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |request: Request, state: AppState| -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(f(request, state))
        },
    )
}

/// Register routes: `route!(router, Get "/" => { views::home }, Post "/contact/" => { handler, middleware })`.
#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                $crate::router::Method::$method,
                $path,
                $crate::router::handler($handler),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            if a.is_empty() {
                return None;
            }
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}

/// Pre-middleware marking requests that carry the admin token, either as
/// `Authorization: Bearer <token>` or `?token=<token>`.
pub fn authenticate(admin_token: Option<String>) -> Middleware {
    Arc::new(move |ctx| {
        let Some(expected) = admin_token.as_deref() else {
            return None;
        };
        let bearer = ctx
            .headers
            .get("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        let query = ctx.query.get("token").map(String::as_str);
        ctx.is_authenticated = bearer == Some(expected) || query == Some(expected);
        None
    })
}

/// Route middleware rejecting requests that did not authenticate.
pub fn require_admin() -> Middleware {
    Arc::new(|ctx| {
        if ctx.is_authenticated {
            None
        } else {
            Some(Response::forbidden("403 Forbidden"))
        }
    })
}

/// Pre-middleware stamping the request start time.
pub fn request_timer() -> Middleware {
    Arc::new(|ctx| {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Post-middleware logging method, path, status and elapsed time.
pub fn access_log() -> PostMiddleware {
    Arc::new(|ctx, response| {
        let elapsed = ctx
            .start_time
            .map(|t| format!("{:.1?}", t.elapsed()))
            .unwrap_or_else(|| "-".to_string());
        log::info!(
            "{:?} {} -> {} ({})",
            ctx.method,
            ctx.path,
            response.status_code,
            elapsed
        );
        response
    })
}
