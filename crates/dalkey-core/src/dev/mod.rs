//! Dev-serving support: HMR protocol, hot-update coordination, and the
//! per-request transform pipeline. The HTTP/WebSocket server itself lives in
//! the CLI crate.

pub mod hmr;
pub mod protocol;
pub mod transform;

pub use hmr::{decide_update, inject_client_script, HotRegistry, CLIENT_RUNTIME};
pub use protocol::{ClientMessage, HmrMessage};
pub use transform::{RequestError, RequestPipeline, ServedModule};
