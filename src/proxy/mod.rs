//
// src/proxy/mod.rs
//
mod backend;
mod capture;
mod directory;
mod forwarder;
mod pool;
mod proxy;

pub use backend::BackendSet;
pub use capture::{CapturedBody, ResponseCapture};
pub use directory::BackendDirectory;
pub use forwarder::{
    parse_backend_url, Forwarded, Forwarder, X_FORWARDED_FOR, X_FORWARDED_HOST,
    X_FORWARDED_PROTO, X_REAL_IP,
};
pub use pool::BackendRegistry;
pub use proxy::{Proxy, ProxyError, API_KEY_HEADER};
