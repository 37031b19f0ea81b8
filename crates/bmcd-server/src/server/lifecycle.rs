//! Runs the metrics endpoint and the gRPC listener under one cancellation
//! scope.
//!
//! # Flow
//!
//! ```text
//! run(shutdown, config, service, registry)
//!   ├── spawn: bind metrics_addr → serve /metrics ─┐
//!   └── inline: bind rpc_addr → serve gRPC ────────┤
//!                                                   ▼
//!        first to finish decides: error → fatal, cancel → Ok(())
//! ```
//!
//! Both listeners go through the same supervisor, so a failure of either one
//! surfaces the same way: as [`Error::Listener`] tagged with its
//! [`ListenerKind`]. Nothing here exits the process; the caller decides.
//!
//! - A metrics failure returns immediately, dropping the gRPC server.
//! - A gRPC failure cancels the scope, waits for the metrics endpoint to stop
//!   and is returned.
//! - Cancelling `shutdown` stops both listeners gracefully and returns
//!   `Ok(())`.

use crate::server::{config::ServerConfig, metrics, rpc, service::MachineService};
use core::{fmt, future::Future};
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task::JoinError};
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Metrics,
    Rpc,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Metrics => "metrics endpoint",
            Self::Rpc => "gRPC listener",
        })
    }
}

/// Why a listener stopped abnormally.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("could not bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("stopped serving")]
    Serve(#[source] BoxError),
    #[error("task did not run to completion")]
    Join(#[from] JoinError),
}

impl Failure {
    fn serve(err: impl Into<BoxError>) -> Self {
        Self::Serve(err.into())
    }
}

/// A fatal listener failure. The process should exit non-zero.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} failed")]
    Listener {
        kind: ListenerKind,
        #[source]
        source: Failure,
    },
}

impl Error {
    pub const fn kind(&self) -> ListenerKind {
        match self {
            Self::Listener { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    NotStarted,
    Running,
    Stopped(Outcome),
}

/// State of one listener: `NotStarted → Running → Stopped(ok | error)`.
///
/// A bind failure goes straight from `NotStarted` to `Stopped(Error)`.
/// `Stopped` is terminal; any other transition is logged and ignored.
#[derive(Debug)]
pub struct ListenerLifecycle {
    kind: ListenerKind,
    state: ListenerState,
}

impl ListenerLifecycle {
    pub const fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            state: ListenerState::NotStarted,
        }
    }

    pub const fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub const fn state(&self) -> ListenerState {
        self.state
    }

    /// Moves to `next` if the transition is legal. Returns whether it was.
    pub fn transition(&mut self, next: ListenerState) -> bool {
        use ListenerState::{NotStarted, Running, Stopped};

        let legal = matches!(
            (self.state, next),
            (NotStarted, Running) | (NotStarted, Stopped(Outcome::Error)) | (Running, Stopped(_))
        );
        if !legal {
            tracing::warn!(listener = %self.kind, from = ?self.state, to = ?next, "ignoring illegal listener transition");
            return false;
        }

        match next {
            Running => tracing::info!(listener = %self.kind, "listener running"),
            Stopped(Outcome::Ok) => tracing::info!(listener = %self.kind, "listener stopped"),
            Stopped(Outcome::Error) => tracing::error!(listener = %self.kind, "listener failed"),
            NotStarted => {}
        }
        self.state = next;
        true
    }
}

/// Binds `addr` and runs `serve` on it, tracking the listener's lifecycle.
async fn supervise<F, Fut>(kind: ListenerKind, addr: SocketAddr, serve: F) -> Result<(), Error>
where
    F: FnOnce(TcpListener) -> Fut,
    Fut: Future<Output = Result<(), Failure>>,
{
    let mut lifecycle = ListenerLifecycle::new(kind);

    let result = match TcpListener::bind(addr).await {
        Ok(listener) => {
            lifecycle.transition(ListenerState::Running);
            serve(listener).await
        }
        Err(source) => Err(Failure::Bind { addr, source }),
    };

    let outcome = if result.is_ok() {
        Outcome::Ok
    } else {
        Outcome::Error
    };
    lifecycle.transition(ListenerState::Stopped(outcome));
    result.map_err(|source| Error::Listener { kind, source })
}

fn joined(kind: ListenerKind, result: Result<Result<(), Error>, JoinError>) -> Result<(), Error> {
    result.map_err(|err| Error::Listener {
        kind,
        source: Failure::Join(err),
    })?
}

/// Runs both listeners until `shutdown` is cancelled or one of them fails.
///
/// # Errors
///
/// Returns [`Error::Listener`] for the first listener that failed to bind or
/// stopped serving on its own.
pub async fn run(
    shutdown: CancellationToken,
    config: &ServerConfig,
    service: MachineService,
    registry: Arc<Registry>,
) -> Result<(), Error> {
    let scope = shutdown.child_token();

    let metrics_scope = scope.clone();
    let mut metrics_task = tokio::spawn(supervise(
        ListenerKind::Metrics,
        config.metrics_addr,
        move |listener| async move {
            metrics::serve_on(listener, registry, metrics_scope)
                .await
                .map_err(Failure::serve)
        },
    ));

    let rpc_scope = scope.clone();
    let rpc = supervise(ListenerKind::Rpc, config.rpc_addr, move |listener| async move {
        rpc::serve_on(listener, service, rpc_scope)
            .await
            .map_err(Failure::serve)
    });
    tokio::pin!(rpc);

    tokio::select! {
        result = &mut metrics_task => {
            if let Err(err) = joined(ListenerKind::Metrics, result) {
                scope.cancel();
                return Err(err);
            }
            // The metrics endpoint only stops cleanly once the scope is
            // cancelled, so the gRPC listener is already draining.
            rpc.await
        }
        result = &mut rpc => {
            scope.cancel();
            let metrics_result = joined(ListenerKind::Metrics, metrics_task.await);
            result?;
            metrics_result
        }
    }
}
