//! `dalkey dev` command implementation.
//!
//! Unbundled dev server: each module request runs the transform pipeline on
//! demand and is served as an ES module, with hot updates pushed over a
//! WebSocket at `/__hmr`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use dalkey_core::build::graph::{ModuleGraph, ModuleRecord};
use dalkey_core::dev::{
    decide_update, inject_client_script, ClientMessage, HmrMessage, HotRegistry, RequestError,
    RequestPipeline, CLIENT_RUNTIME,
};
use dalkey_core::paths::is_script_path;
use dalkey_core::plugin::{HotUpdateContext, ServerContext};
use dalkey_core::{scan_imports, Config, PluginContainer, Resolver};
use miette::{IntoDiagnostic, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

/// Dev server action resolved from CLI flags.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Project root.
    pub cwd: PathBuf,
    /// Port override.
    pub port: Option<u16>,
    /// Host override.
    pub host: Option<String>,
    /// Open browser automatically.
    pub open: bool,
}

/// Shared server state.
struct DevState {
    config: Arc<Config>,
    /// Broadcast channel fanning hot updates out to connected clients.
    hmr_tx: broadcast::Sender<HmrMessage>,
    pipeline: RequestPipeline,
    plugins: Arc<PluginContainer>,
    resolver: Resolver,
    /// Module graph discovered from served modules.
    graph: RwLock<ModuleGraph>,
    /// Client hot-accept / decline registrations.
    registry: HotRegistry,
    /// Plugin-registered middlewares, consulted before built-in handlers.
    server_ctx: ServerContext,
}

/// Run the dev server until interrupted.
pub async fn run(action: DevAction) -> Result<()> {
    let cwd = dunce::canonicalize(&action.cwd).into_diagnostic()?;

    let mut config = Config::load(&cwd).into_diagnostic()?;
    if let Some(port) = action.port {
        config.server.port = port;
    }
    if let Some(host) = &action.host {
        config.server.host = host.clone();
    }
    let config = Arc::new(config);

    let mut plugins = super::build::default_plugins(&config);
    plugins.set_watch(true);
    plugins
        .config_resolved(&config)
        .map_err(|e| miette::miette!("{e}"))?;

    let mut server_ctx = ServerContext::new(cwd.clone());
    plugins
        .configure_server(&mut server_ctx)
        .map_err(|e| miette::miette!("{e}"))?;

    let plugins = Arc::new(plugins);
    let resolver = Resolver::new(&config);
    let pipeline = RequestPipeline::new(Arc::clone(&config), Arc::clone(&plugins));

    let (hmr_tx, _) = broadcast::channel::<HmrMessage>(16);

    let state = Arc::new(DevState {
        config: Arc::clone(&config),
        hmr_tx: hmr_tx.clone(),
        pipeline,
        plugins,
        resolver,
        graph: RwLock::new(ModuleGraph::new()),
        registry: HotRegistry::new(),
        server_ctx,
    });

    // File watcher runs on a dedicated thread; changes are debounced and
    // forwarded to the async handler. The stop flag ends its loop during
    // shutdown.
    let (change_tx, mut change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let watcher_stop = Arc::new(AtomicBool::new(false));
    let watch_root = cwd.clone();
    let watch_stop = Arc::clone(&watcher_stop);
    let watcher_thread = std::thread::spawn(move || {
        if let Err(e) = watch_files(&watch_root, &change_tx, &watch_stop) {
            tracing::error!(error = %e, "file watcher stopped");
        }
    });

    let change_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(changed) = change_rx.recv().await {
            handle_file_change(&change_state, &changed);
        }
    });

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/__hmr", get(hmr_websocket))
        .route("/@dalkey/client", get(serve_client_runtime))
        .route("/*path", get(serve_path))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let host_ip = if config.server.host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        config.server.host.clone()
    };
    let addr: SocketAddr = format!("{host_ip}:{}", config.server.port)
        .parse()
        .into_diagnostic()?;

    println!();
    println!(
        "  Dev server running at http://{}:{}",
        config.server.host, config.server.port
    );
    println!("  Hot Module Replacement enabled");
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    if action.open {
        let _ = open_browser(&format!(
            "http://{}:{}",
            config.server.host, config.server.port
        ));
    }

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    // The listener and client sockets are down at this point; stop the
    // watcher loop and wait for it to release its filesystem handles.
    // Storing the flag again is a no-op, so teardown stays idempotent.
    watcher_stop.store(true, Ordering::Relaxed);
    let _ = watcher_thread.join();

    Ok(())
}

// ============================================================================
// Route handlers
// ============================================================================

async fn serve_index(State(state): State<Arc<DevState>>) -> Html<String> {
    Html(index_html(&state))
}

fn index_html(state: &DevState) -> String {
    let user_index = state.config.root.join("index.html");
    let html = if user_index.is_file() {
        std::fs::read_to_string(&user_index).unwrap_or_else(|_| fallback_index(&state.config))
    } else {
        fallback_index(&state.config)
    };
    if html.contains("/@dalkey/client") {
        html
    } else {
        inject_client_script(&html)
    }
}

fn fallback_index(config: &Config) -> String {
    let entry_tag = config
        .entries
        .first()
        .map(|e| format!(r#"  <script type="module" src="/{}"></script>"#, e.display()))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>dalkey dev</title>
</head>
<body>
  <div id="root"></div>
{entry_tag}
</body>
</html>"#
    )
}

async fn serve_client_runtime() -> impl IntoResponse {
    (
        [
            ("Content-Type", "application/javascript"),
            ("Cache-Control", "no-cache"),
        ],
        CLIENT_RUNTIME,
    )
}

/// Serve a module, static asset, or SPA fallback.
async fn serve_path(
    State(state): State<Arc<DevState>>,
    AxumPath(path): AxumPath<String>,
) -> Response {
    let url_path = format!("/{path}");
    // Strip cache-busting query suffixes (?t=...).
    let url_path = url_path.split('?').next().unwrap_or(&url_path).to_string();

    // Plugin middlewares run first.
    for middleware in &state.server_ctx.middlewares {
        if let Some(response) = (middleware.handler)(&url_path, "GET") {
            return Response::builder()
                .status(response.status)
                .header("Content-Type", response.content_type)
                .body(response.body.into())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }

    let ext = url_path.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "json" | "css" => {
            serve_module(&state, &url_path)
        }
        _ => serve_static(&state, &path, &url_path),
    }
}

fn serve_module(state: &DevState, url_path: &str) -> Response {
    match state.pipeline.serve(url_path) {
        Ok(module) => {
            if !module.file_path.is_empty() {
                register_module(state, &module.file_path);
            }
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", module.content_type)
                .header("Cache-Control", "no-cache")
                .body(module.code.into())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            let status = match &e {
                RequestError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(url = url_path, error = %e, "module request failed");
            Response::builder()
                .status(status)
                .header("Content-Type", "application/javascript")
                .body(
                    format!(
                        "console.error('dalkey: {}');",
                        e.to_string().replace('\'', "\\'")
                    )
                    .into(),
                )
                .unwrap_or_else(|_| status.into_response())
        }
    }
}

/// Record a served module and its resolved imports in the graph.
fn register_module(state: &DevState, file_path: &str) {
    let Ok(source) = std::fs::read_to_string(file_path) else {
        return;
    };
    let mut dependencies = Vec::new();
    if is_script_path(Path::new(file_path)) {
        for import in scan_imports(&source) {
            if let Ok(dep) = state
                .resolver
                .resolve(&import.raw, Path::new(file_path), &state.plugins)
            {
                dependencies.push(dep);
            }
        }
    }
    state.graph.write().unwrap().insert(ModuleRecord {
        id: file_path.to_string(),
        dependencies,
        is_entry: false,
    });
}

fn serve_static(state: &DevState, rel_path: &str, url_path: &str) -> Response {
    let file_path = state.config.root.join(rel_path);
    let ext = url_path.rsplit('.').next().unwrap_or("");

    if file_path.is_file() {
        if ext == "html" {
            return match std::fs::read_to_string(&file_path) {
                Ok(html) => Html(inject_client_script(&html)).into_response(),
                Err(_) => {
                    (StatusCode::NOT_FOUND, format!("Not found: {url_path}")).into_response()
                }
            };
        }
        let content_type = static_content_type(ext);
        return match std::fs::read(&file_path) {
            Ok(bytes) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", content_type)
                .body(bytes.into())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            Err(_) => (StatusCode::NOT_FOUND, format!("Not found: {url_path}")).into_response(),
        };
    }

    if !url_path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .contains('.')
    {
        // SPA fallback: extensionless misses are client-side routes.
        return Html(index_html(state)).into_response();
    }

    (StatusCode::NOT_FOUND, format!("Not found: {url_path}")).into_response()
}

fn static_content_type(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// WebSocket HMR
// ============================================================================

async fn hmr_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DevState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_hmr_socket(socket, state))
}

async fn handle_hmr_socket(mut socket: WebSocket, state: Arc<DevState>) {
    let mut rx = state.hmr_tx.subscribe();

    if socket
        .send(Message::Text(HmrMessage::Connected.to_json()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            Ok(msg) = rx.recv() => {
                if socket.send(Message::Text(msg.to_json())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_client_message(&state, &text),
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

fn handle_client_message(state: &DevState, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => {
            state.registry.apply(&msg);
            if let ClientMessage::Invalidate { path } = &msg {
                tracing::debug!(path = %path, "client invalidated module");
                state.pipeline.invalidate_all();
                let _ = state.hmr_tx.send(HmrMessage::Reload);
            }
        }
        Err(e) => tracing::debug!(error = %e, "unparseable client message"),
    }
}

// ============================================================================
// File watching
// ============================================================================

/// Paths the watcher never reports.
fn should_ignore(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    if path_str.contains("/node_modules/")
        || path_str.contains("/target/")
        || path_str.contains("/.git/")
        || path_str.contains("/dist/")
    {
        return true;
    }
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Whether a changed file is relevant to the dev session.
fn is_watchable(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(
        ext,
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "css" | "json" | "html"
    )
}

const DEBOUNCE_MS: u128 = 50;

fn watch_files(
    root: &Path,
    change_tx: &mpsc::Sender<Vec<PathBuf>>,
    stop: &AtomicBool,
) -> notify::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut last_flush = std::time::Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if !should_ignore(&path) && is_watchable(&path) {
                        pending.insert(path);
                    }
                }
                if pending.is_empty() {
                    continue;
                }
                let now = std::time::Instant::now();
                if now.duration_since(last_flush).as_millis() < DEBOUNCE_MS {
                    continue;
                }
                last_flush = now;
                let changed: Vec<PathBuf> = pending.drain().collect();
                if change_tx.blocking_send(changed).is_err() {
                    break;
                }
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "watch error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Quiet period: flush whatever the debounce window held.
                if !pending.is_empty() {
                    last_flush = std::time::Instant::now();
                    let changed: Vec<PathBuf> = pending.drain().collect();
                    if change_tx.blocking_send(changed).is_err() {
                        break;
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

/// Invalidate caches and broadcast a hot update for each changed file.
fn handle_file_change(state: &DevState, changed: &[PathBuf]) {
    let timestamp = u64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX);

    for path in changed {
        let file = dunce::canonicalize(path).unwrap_or_else(|_| path.clone());
        let file_str = file.display().to_string();
        let url = file_to_url(&state.config.root, &file);

        tracing::info!(file = %url, "file changed");
        state.pipeline.invalidate(&file_str);

        // Deleted file: drop it from the graph and tell clients to prune.
        if !file.is_file() {
            state.graph.write().unwrap().remove(&file_str);
            let _ = state.hmr_tx.send(HmrMessage::Prune { path: url });
            continue;
        }

        // The update names the changed module plus advisory plugin hints
        // only; importers re-fetch through the module request path.
        let mut affected: Vec<String> = Vec::new();
        if let Ok(hints) = state.plugins.watch_change(&file_str) {
            affected.extend(hints);
        }
        let hot_ctx = HotUpdateContext {
            file: file_str.clone(),
            timestamp,
            modules: affected.clone(),
        };
        if let Ok(hints) = state.plugins.handle_hot_update(&hot_ctx) {
            affected.extend(hints);
        }
        affected.sort();
        affected.dedup();

        let msg = decide_update(&url, is_script_path(&file), affected, &state.registry, timestamp);
        if matches!(msg, HmrMessage::Reload) {
            // Stale transforms may survive a reload decision; drop them all.
            state.pipeline.invalidate_all();
        }
        let _ = state.hmr_tx.send(msg);
    }
}

/// Map an absolute file path to a root-relative URL path.
fn file_to_url(root: &Path, file: &Path) -> String {
    let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    match file.strip_prefix(&root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => format!("/{}", file.display()),
    }
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}
