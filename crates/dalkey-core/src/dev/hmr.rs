//! Hot-update coordination.
//!
//! Tracks which modules have registered hot-accept handlers or declined
//! updates, decides whether a file change becomes a targeted update or a
//! full reload, and carries the browser-side client runtime.

use crate::dev::protocol::{ClientMessage, HmrMessage};
use std::collections::HashSet;
use std::sync::RwLock;

/// Per-session record of client hot-accept and decline registrations.
///
/// Keyed by root-relative URL path. Shared between the WebSocket handler
/// (writes) and the file watcher (reads).
#[derive(Debug, Default)]
pub struct HotRegistry {
    accepted: RwLock<HashSet<String>>,
    declined: RwLock<HashSet<String>>,
}

impl HotRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a client registration message.
    pub fn apply(&self, message: &ClientMessage) {
        match message {
            ClientMessage::HotAccept { path } => {
                self.accepted.write().unwrap().insert(path.clone());
            }
            ClientMessage::Decline { path } => {
                self.declined.write().unwrap().insert(path.clone());
            }
            ClientMessage::Invalidate { path } => {
                self.accepted.write().unwrap().remove(path);
            }
        }
    }

    #[must_use]
    pub fn is_declined(&self, path: &str) -> bool {
        self.declined.read().unwrap().contains(path)
    }

    #[must_use]
    pub fn is_accepted(&self, path: &str) -> bool {
        self.accepted.read().unwrap().contains(path)
    }
}

/// Decide the outgoing message for a file change.
///
/// Script changes become targeted updates carrying the affected module set;
/// anything else, and any change touching a declined module, falls back to
/// a full reload. The affected set always contains the changed module
/// itself.
#[must_use]
pub fn decide_update(
    path: &str,
    is_script: bool,
    affected: Vec<String>,
    registry: &HotRegistry,
    timestamp: u64,
) -> HmrMessage {
    if !is_script {
        return HmrMessage::Reload;
    }
    if registry.is_declined(path) || affected.iter().any(|m| registry.is_declined(m)) {
        return HmrMessage::Reload;
    }

    let mut modules = affected;
    if !modules.iter().any(|m| m == path) {
        modules.push(path.to_string());
    }
    modules.sort();

    HmrMessage::Update {
        path: path.to_string(),
        modules,
        timestamp,
    }
}

/// Browser-side HMR client, served at `/@dalkey/client`.
pub const CLIENT_RUNTIME: &str = r#"// dalkey hmr client
const socketUrl = `ws://${location.host}/__hmr`;
let socket;
let reconnectTimer;

const hotContexts = new Map();
const dataStore = new Map();

function connect() {
  socket = new WebSocket(socketUrl);

  socket.addEventListener('message', (event) => {
    const msg = JSON.parse(event.data);
    switch (msg.type) {
      case 'connected':
        console.log('[dalkey] connected');
        break;
      case 'update':
        handleUpdate(msg);
        break;
      case 'reload':
        location.reload();
        break;
      case 'error':
        console.error(`[dalkey] ${msg.message}`);
        if (msg.stack) console.error(msg.stack);
        break;
      case 'prune':
        handlePrune(msg.path);
        break;
    }
  });

  socket.addEventListener('close', () => {
    console.log('[dalkey] connection lost, retrying...');
    clearTimeout(reconnectTimer);
    reconnectTimer = setTimeout(connect, 1000);
  });
}

async function handleUpdate(msg) {
  for (const path of msg.modules) {
    const ctx = hotContexts.get(path);
    if (!ctx || !ctx.acceptCallbacks.length) {
      // No accepting boundary for this module: hard reload.
      location.reload();
      return;
    }
    for (const dispose of ctx.disposeCallbacks) {
      dispose(dataStore.get(path));
    }
    ctx.disposeCallbacks = [];
    try {
      const fresh = await import(`${path}?t=${msg.timestamp}`);
      for (const cb of ctx.acceptCallbacks) {
        cb(fresh);
      }
    } catch (err) {
      console.error(`[dalkey] failed to hot update ${path}`, err);
      location.reload();
      return;
    }
  }
}

function handlePrune(path) {
  const ctx = hotContexts.get(path);
  if (ctx) {
    for (const dispose of ctx.disposeCallbacks) {
      dispose(dataStore.get(path));
    }
  }
  hotContexts.delete(path);
  dataStore.delete(path);
}

function send(payload) {
  if (socket && socket.readyState === WebSocket.OPEN) {
    socket.send(JSON.stringify(payload));
  }
}

export function createHotContext(path) {
  if (!dataStore.has(path)) dataStore.set(path, {});
  const ctx = {
    acceptCallbacks: [],
    disposeCallbacks: [],
    get data() {
      return dataStore.get(path);
    },
    accept(cb) {
      ctx.acceptCallbacks.push(cb || (() => {}));
      send({ type: 'hotAccept', path });
    },
    acceptDeps(deps, cb) {
      const list = Array.isArray(deps) ? deps : [deps];
      for (const dep of list) {
        const depCtx = hotContexts.get(dep) || createHotContext(dep);
        depCtx.acceptCallbacks.push(cb || (() => {}));
        send({ type: 'hotAccept', path: dep });
      }
      send({ type: 'hotAccept', path });
    },
    dispose(cb) {
      ctx.disposeCallbacks.push(cb);
    },
    decline() {
      send({ type: 'decline', path });
    },
    invalidate() {
      send({ type: 'invalidate', path });
    },
  };
  hotContexts.set(path, ctx);
  return ctx;
}

connect();
"#;

/// Inject the client runtime script tag into served HTML.
///
/// Inserted just before `</head>` when present, otherwise prepended.
#[must_use]
pub fn inject_client_script(html: &str) -> String {
    const TAG: &str = r#"<script type="module" src="/@dalkey/client"></script>"#;
    if let Some(pos) = html.find("</head>") {
        let mut out = String::with_capacity(html.len() + TAG.len() + 1);
        out.push_str(&html[..pos]);
        out.push_str(TAG);
        out.push('\n');
        out.push_str(&html[pos..]);
        out
    } else {
        format!("{TAG}\n{html}")
    }
}
