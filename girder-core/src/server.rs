//! Blocking acceptor
//!
//! ```text
//! TcpListener::accept ──▶ ActiveConnection guard ──▶ ThreadPool::execute
//!                                                    └─▶ ConnectionHandler::handle
//! ```
//!
//! With `workers = 0` connections are handled inline on the accept thread.

use crate::application::Application;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use crate::error::Result;
use crate::listener::bind_with_fallback;
use crate::logging::{error, info};
use crate::worker::ThreadPool;
use std::net::{SocketAddr, TcpListener};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts one in-flight connection for as long as it lives.
///
/// Decrements on drop, so every exit path of a connection (including a
/// panic unwinding through the worker) releases its slot.
pub struct ActiveConnection {
    counter: Arc<AtomicUsize>,
}

impl ActiveConnection {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A bound server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: ConnectionHandler,
    active: Arc<AtomicUsize>,
    pool: Option<ThreadPool>,
}

impl Server {
    /// Validate `config`, bind the listener and start the worker pool.
    pub fn bind(mut app: Application, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        app.configure(&config);

        let (listener, port) = bind_with_fallback(
            &config.host,
            config.port,
            config.auto_port,
            config.max_port_attempts,
        )?;
        let local_addr = listener.local_addr()?;

        let workers = config.worker_mode().worker_count();
        let pool = match workers {
            0 => None,
            n => Some(ThreadPool::new(n, "girder-worker")?),
        };

        if port != config.port && config.port != 0 {
            info!(requested = config.port, port, "Bound to fallback port");
        }
        info!(address = %local_addr, workers, "Server listening");

        let active = app.stats().active_handle();
        Ok(Self {
            listener,
            local_addr,
            handler: ConnectionHandler::new(Arc::new(app), Arc::new(config)),
            active,
            pool,
        })
    }

    /// Accept connections until the process exits. Accept failures are
    /// logged and the loop continues.
    pub fn start(&self) -> Result<()> {
        loop {
            if let Err(err) = self.accept_one() {
                error!(error = %err, "Accept failed");
            }
        }
    }

    /// Accept and dispatch exactly one connection.
    pub fn accept_one(&self) -> Result<()> {
        let (stream, peer) = self.listener.accept()?;
        let guard = ActiveConnection::new(Arc::clone(&self.active));
        let handler = self.handler.clone();

        match &self.pool {
            Some(pool) => pool.execute(move || {
                let _guard = guard;
                handler.handle(stream, peer);
            }),
            None => {
                let _guard = guard;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(stream, peer)));
                if outcome.is_err() {
                    error!(peer = %peer, "Connection handler panicked");
                }
                Ok(())
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The port actually bound, after any fallback
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Worker threads, 0 when single-threaded
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, ThreadPool::size)
    }

    pub fn app(&self) -> &Arc<Application> {
        self.handler.app()
    }
}
