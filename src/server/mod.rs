//! HTTP front end.
//!
//! A synchronous `tiny_http` server: the accept loop hands every request to
//! its own thread, and the blocking model call is handed on again to the
//! bounded [`pool::InferencePool`].

pub mod context;
pub mod handlers;
pub mod multipart;
pub mod pool;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tiny_http::Server;

use crate::error::StartupError;
pub use context::AppContext;

pub struct ClassifyServer {
    server: Server,
    ctx: Arc<AppContext>,
}

impl ClassifyServer {
    /// Binds `addr` (use port 0 for an ephemeral port).
    pub fn bind(addr: &str, ctx: AppContext) -> Result<ClassifyServer, StartupError> {
        let server = Server::http(addr).map_err(|e| StartupError::Bind {
            addr: addr.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(ClassifyServer { server, ctx: Arc::new(ctx) })
    }

    /// The bound TCP address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves requests until the listener closes.
    pub fn run(self) {
        if let Some(addr) = self.local_addr() {
            info!("listening on http://{}", addr);
        }
        for request in self.server.incoming_requests() {
            let ctx = Arc::clone(&self.ctx);
            let spawned = std::thread::Builder::new()
                .name("request".into())
                .spawn(move || routes::dispatch(request, ctx));
            if let Err(e) = spawned {
                error!("could not spawn request thread: {}", e);
            }
        }
        info!("server stopped");
    }
}
