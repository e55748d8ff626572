//! gRPC channels over unix domain sockets.

use std::time::Duration;

use camino::Utf8Path;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use super::DialError;

/// Placeholder authority; the connector ignores it and dials the socket.
const UNIX_ORIGIN: &str = "http://[::]:50051";

/// Opens a gRPC channel to the server listening on `path`.
///
/// The whole dial, including the HTTP/2 handshake, is bounded by `timeout`.
pub async fn connect_unix(path: &Utf8Path, timeout: Duration) -> Result<Channel, DialError> {
    let socket = path.to_path_buf();
    let connector = service_fn(move |_: Uri| {
        let socket = socket.clone();
        async move {
            let stream = UnixStream::connect(socket.as_std_path()).await?;
            Ok::<_, std::io::Error>(TokioIo::new(stream))
        }
    });

    let endpoint = Endpoint::from_static(UNIX_ORIGIN).connect_timeout(timeout);
    match tokio::time::timeout(timeout, endpoint.connect_with_connector(connector)).await {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(source)) => Err(DialError::Connect {
            path: path.to_path_buf(),
            source,
        }),
        Err(_) => Err(DialError::Timeout {
            path: path.to_path_buf(),
            timeout,
        }),
    }
}
