//! HTTP/1.1 transport for the versioned storage service.
//!
//! All four operations are POST endpoints under `/vss` with
//! protobuf-encoded bodies:
//! - `POST /vss/getObject`
//! - `POST /vss/putObjects`
//! - `POST /vss/deleteObject`
//! - `POST /vss/listKeyVersions`
//!
//! [`VssService`] bridges the wire to the engine; [`serve`] runs the
//! accept loop.

pub mod service;

pub use service::VssService;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// Accept connections forever, serving each on its own task.
pub async fn serve(listener: TcpListener, service: VssService) -> std::io::Result<()> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let svc = service.clone();
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!("connection error from {}: {}", remote, e);
            }
        });
    }
}
