use crate::request::PeerCred;
use anyhow::Context;
use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use axum::Router;
use std::fs;
use std::path::Path;
use tokio::net::UnixListener;
use tracing::info;

/// Connection metadata captured when a client attaches to the socket.
///
/// Peer credentials come from the kernel via `SO_PEERCRED`; authentication
/// plugins consume them from the request, the transport only forwards them.
#[derive(Clone, Debug, Default)]
pub struct UdsConnectInfo {
    pub peer: Option<PeerCred>,
}

impl Connected<IncomingStream<'_, UnixListener>> for UdsConnectInfo {
    fn connect_info(stream: IncomingStream<'_, UnixListener>) -> Self {
        let peer = stream.io().peer_cred().ok().map(|cred| PeerCred {
            uid: cred.uid(),
            gid: cred.gid(),
            pid: cred.pid(),
        });
        Self { peer }
    }
}

/// Bind the Unix socket and serve until shutdown.
pub async fn serve(socket: &Path, router: Router) -> anyhow::Result<()> {
    if socket.exists() {
        fs::remove_file(socket)
            .with_context(|| format!("failed to remove stale socket {}", socket.display()))?;
    }
    if let Some(parent) = socket.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let listener = UnixListener::bind(socket)
        .with_context(|| format!("failed to bind {}", socket.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(socket, fs::Permissions::from_mode(0o660))
            .with_context(|| format!("failed to set permissions on {}", socket.display()))?;
    }

    info!(socket = %socket.display(), "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<UdsConnectInfo>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
