// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

use crate::proxy::{BackendDirectory, Proxy};

pub const REGISTER_PATH: &str = "/register";

/// Per-connection service: `/register` goes to the directory, every other
/// path is proxied.
#[derive(Clone)]
pub struct RequestHandler {
    proxy: Arc<Proxy>,
    directory: Arc<BackendDirectory>,
    peer: SocketAddr,
}

impl RequestHandler {
    pub fn new(proxy: Arc<Proxy>, directory: Arc<BackendDirectory>, peer: SocketAddr) -> Self {
        Self {
            proxy,
            directory,
            peer,
        }
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        if req.uri().path() == REGISTER_PATH {
            return self.directory.handle_register(req.uri());
        }
        self.proxy.handle(req, self.peer).await
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.dispatch(req).await) })
    }
}
