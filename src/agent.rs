//! Socket servers and per-connection message pumps.
//!
//! The agent listens on two Unix sockets at once, one for local clients
//! and one for forwarded connections, and treats them identically except for
//! the [`SocketType`] stamped on every request. Each accepted connection
//! gets its own task: requests on a connection are answered strictly in
//! arrival order, while connections make progress independently (an
//! approval prompt sitting open on one never stalls another).

use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{SinkExt as _, TryStreamExt as _};
use log::{debug, error, info};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::codec::Codec;
use crate::error::AgentError;
use crate::handler::{RequestHandler, SocketType};
use crate::proto::{Request, Response};

/// `sun_path` capacity is platform dependent; 104 bytes is the smallest
/// among the targets this agent runs on.
const MAX_SOCKET_PATH: usize = 104;

/// The agent daemon: two listeners sharing one request handler.
#[derive(Debug)]
pub struct Agent {
    handler: Arc<RequestHandler>,
    local_path: PathBuf,
    forwarded_path: PathBuf,
}

impl Agent {
    /// Configure an agent serving `handler` on the two socket paths.
    pub fn new(
        handler: RequestHandler,
        local_path: impl Into<PathBuf>,
        forwarded_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            local_path: local_path.into(),
            forwarded_path: forwarded_path.into(),
        }
    }

    /// Bind both sockets and serve until a termination signal arrives,
    /// then unlink the socket paths.
    ///
    /// Binding failures are fatal; nothing is served with only one socket
    /// up.
    pub async fn run(self) -> Result<(), AgentError> {
        let local = bind_socket(&self.local_path)?;
        let forwarded = bind_socket(&self.forwarded_path)?;
        info!("listening on {} (local)", self.local_path.display());
        info!("listening on {} (forwarded)", self.forwarded_path.display());

        let local_loop = tokio::spawn(serve_listener(
            local,
            SocketType::Local,
            Arc::clone(&self.handler),
        ));
        let forwarded_loop = tokio::spawn(serve_listener(
            forwarded,
            SocketType::Forwarded,
            Arc::clone(&self.handler),
        ));

        wait_for_shutdown().await?;
        info!("shutting down");

        local_loop.abort();
        forwarded_loop.abort();
        for path in [&self.local_path, &self.forwarded_path] {
            if let Err(error) = fs::remove_file(path) {
                debug!("could not unlink {}: {error}", path.display());
            }
        }

        Ok(())
    }
}

/// Prepare a listening socket: clear any stale file, bind, and restrict
/// the path to its owner.
pub fn bind_socket(path: &Path) -> Result<UnixListener, AgentError> {
    if path.as_os_str().len() > MAX_SOCKET_PATH {
        return Err(AgentError::SocketPathTooLong(path.to_path_buf()));
    }

    // remove the socket if it exists
    let _ = fs::remove_file(path);

    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Accept clients forever, one task per connection.
pub async fn serve_listener(
    listener: UnixListener,
    socket_type: SocketType,
    handler: Arc<RequestHandler>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("accepted {socket_type:?} connection");
                    connections.spawn(handle_socket(Arc::clone(&handler), socket_type, stream));
                }
                Err(error) => {
                    error!("accept failed on {socket_type:?} socket: {error}");
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                match finished {
                    Ok(Ok(())) => debug!("{socket_type:?} connection closed"),
                    Ok(Err(error)) => debug!("{socket_type:?} connection ended: {error}"),
                    Err(error) => error!("connection task panicked: {error}"),
                }
            }
        }
    }
}

/// Pump one connection: read frames, dispatch, write responses back in
/// request order. A malformed message gets a `Failure` answer and the
/// connection lives on; an I/O error ends it.
async fn handle_socket(
    handler: Arc<RequestHandler>,
    socket_type: SocketType,
    stream: UnixStream,
) -> Result<(), AgentError> {
    let mut adapter = Framed::new(stream, Codec::<Request, Response>::default());

    while let Some(incoming) = adapter.try_next().await? {
        let response = match incoming {
            Ok(request) => handler.handle(request, socket_type).await,
            Err(error) => {
                debug!("malformed request on {socket_type:?} socket: {error}");
                Response::Failure
            }
        };
        adapter.send(response).await?;
    }

    Ok(())
}

/// Resolve when the process is told to terminate.
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn socket_path_length_is_bounded() {
        let long = format!("/tmp/{}.sock", "x".repeat(MAX_SOCKET_PATH));
        assert!(matches!(
            bind_socket(Path::new(&long)),
            Err(AgentError::SocketPathTooLong(_))
        ));
    }

    #[tokio::test]
    async fn socket_is_owner_only() -> testresult::TestResult {
        use std::os::unix::fs::MetadataExt as _;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("agent.sock");
        let _listener = bind_socket(&path)?;

        let mode = fs::metadata(&path)?.mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[tokio::test]
    async fn stale_sockets_are_replaced() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("agent.sock");

        drop(bind_socket(&path)?);
        // the path still exists; a second bind must succeed anyway
        let _listener = bind_socket(&path)?;
        Ok(())
    }
}
