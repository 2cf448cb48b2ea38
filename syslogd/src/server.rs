//! Listener manager.
//!
//! A [`Server`] owns the handler chain and one receive task per open
//! endpoint. Each task reads one unit at a time (a datagram, or the first
//! read of an accepted stream connection), decodes it and runs the handler
//! chain before reading again, so messages from one endpoint are handled in
//! arrival order.

use chrono::Utc;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UdpSocket, UnixListener};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alias::HostnameAliases;
use crate::config::{ListenerConfig, OutputKind, ServerConfig, Transport};
use crate::decoder::{Decoder, TagRunes};
use crate::error::{Result, ServerError};
use crate::fatal::{ExitSink, FatalSink};
use crate::filter::MessageFilter;
use crate::handler::{Handler, HandlerChain};
use crate::message::MessageSource;
use crate::output::{JsonOutput, LogOutput};

/// Syslog server: registered listeners plus the handler chain they feed.
pub struct Server {
    handlers: Arc<HandlerChain>,
    decoder: Arc<Decoder>,
    sink: Arc<dyn FatalSink>,
    listeners: Vec<Listener>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("handlers", &self.handlers.len())
            .field("listeners", &self.listeners)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create an idle server that exits the process on fatal errors.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(HandlerChain::new()),
            decoder: Arc::new(Decoder::default()),
            sink: Arc::new(ExitSink),
            listeners: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a server with the handler chain described by `config`:
    /// hostname aliases, then the filter, then the output.
    ///
    /// Listeners are not started.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut server = Self::new();
        server.set_allowed_runes(&config.allowed_tag_runes);

        if !config.hostname_aliases.is_empty() {
            server.add_handler(HostnameAliases::new(config.hostname_aliases.clone()));
        }

        if !config.filter.is_empty() {
            server.add_handler(MessageFilter::compile(&config.filter)?);
        }

        match config.output {
            OutputKind::Log => server.add_handler(LogOutput),
            OutputKind::Json => server.add_handler(JsonOutput::stdout()),
        }

        Ok(server)
    }

    /// Replace the sink that receives fatal listener errors.
    ///
    /// Only affects listeners started afterwards.
    pub fn set_fatal_sink(&mut self, sink: impl FatalSink + 'static) {
        self.sink = Arc::new(sink);
    }

    /// Append a handler to the chain.
    ///
    /// Listeners take a snapshot of the chain when they start; handlers
    /// added later only reach listeners started later.
    pub fn add_handler(&mut self, handler: impl Handler + 'static) {
        self.add_shared_handler(Arc::new(handler));
    }

    /// Append an already shared handler to the chain.
    pub fn add_shared_handler(&mut self, handler: Arc<dyn Handler>) {
        Arc::make_mut(&mut self.handlers).push(handler);
    }

    /// Replace the extra characters allowed in program tags.
    pub fn set_allowed_runes(&mut self, allowed: &str) {
        Arc::make_mut(&mut self.decoder).set_allowed_runes(allowed);
    }

    pub fn allowed_runes(&self) -> &TagRunes {
        self.decoder.tag_runes()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Bound addresses of the network listeners, in registration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().filter_map(|l| l.local_addr).collect()
    }

    /// Open an endpoint with default settings and start receiving on it.
    ///
    /// `address` is `host:port` for network transports or a filesystem path
    /// for [`Transport::Local`].
    pub async fn listen(&mut self, address: &str, transport: Transport) -> Result<()> {
        self.listen_with(&ListenerConfig::new(transport, address))
            .await
    }

    /// Open an endpoint described by `config` and start receiving on it.
    ///
    /// Only failures to open the endpoint are returned; errors inside the
    /// receive loop go to the fatal sink.
    pub async fn listen_with(&mut self, config: &ListenerConfig) -> Result<()> {
        let transport = config.protocol;
        let address = config.bind.clone();
        validate_address(transport, &address)?;

        let ctx = ReceiveContext {
            address: address.clone(),
            handlers: self.handlers.clone(),
            decoder: self.decoder.clone(),
            sink: self.sink.clone(),
            shutdown: self.shutdown.clone(),
            buffer_size: config.max_message_size.max(1),
        };
        let (close_tx, close_rx) = watch::channel(false);
        let bind_error = |source| ServerError::Bind {
            transport,
            address: address.clone(),
            source,
        };

        let (task, local_addr, socket_path) = match transport {
            Transport::Datagram => {
                let socket = UdpSocket::bind(&address).await.map_err(bind_error)?;
                let local_addr = socket.local_addr().ok();
                let task = tokio::spawn(run_datagram(socket, ctx, close_rx));
                (task, local_addr, None)
            }
            Transport::Stream => {
                let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
                let local_addr = listener.local_addr().ok();
                let task = tokio::spawn(run_tcp(listener, ctx, close_rx));
                (task, local_addr, None)
            }
            Transport::Local => {
                let path = PathBuf::from(&address);
                let listener = bind_unix(&path, config).map_err(bind_error)?;
                let task = tokio::spawn(run_unix(listener, ctx, close_rx));
                (task, None, Some(path))
            }
        };

        tracing::info!(
            transport = %transport,
            address = %local_addr.map(|a| a.to_string()).unwrap_or_else(|| address.clone()),
            "Syslog listener started"
        );

        self.listeners.push(Listener {
            transport,
            address,
            local_addr,
            socket_path,
            close_tx,
            task,
        });

        Ok(())
    }

    /// Start every listener in `configs`, stopping at the first failure.
    pub async fn listen_all(&mut self, configs: &[ListenerConfig]) -> Result<()> {
        for config in configs {
            self.listen_with(config).await?;
        }
        Ok(())
    }

    /// Stop the server.
    ///
    /// Closes every listener (close failures go to the fatal sink), sends
    /// the termination signal through the handler chain, then drops the
    /// listeners and handlers.
    pub async fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        for listener in std::mem::take(&mut self.listeners) {
            if let Err(e) = listener.close().await {
                self.sink.report(e);
            }
        }

        self.handlers.dispatch(None);
        self.handlers = Arc::new(HandlerChain::new());

        tracing::info!("Syslog server stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// An open endpoint and its receive task.
#[derive(Debug)]
struct Listener {
    transport: Transport,
    address: String,
    local_addr: Option<SocketAddr>,
    socket_path: Option<PathBuf>,
    close_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Listener {
    async fn close(self) -> Result<()> {
        let Listener {
            transport,
            address,
            socket_path,
            close_tx,
            task,
            ..
        } = self;

        // The task may already have ended after a fatal error.
        let _ = close_tx.send(true);
        task.await.map_err(|e| ServerError::close(&address, e))?;

        if let Some(path) = socket_path {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ServerError::close(&address, e)),
            }
        }

        tracing::info!(transport = %transport, address = %address, "Syslog listener closed");
        Ok(())
    }
}

fn validate_address(transport: Transport, address: &str) -> Result<()> {
    let reason = if address.is_empty() {
        Some("empty address")
    } else if transport.is_network() && !address.contains(':') {
        Some("expected host:port")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ServerError::InvalidAddress {
            transport,
            address: address.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn bind_unix(path: &Path, config: &ListenerConfig) -> std::io::Result<UnixListener> {
    if config.remove_existing_socket && path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(config.socket_mode))?;
    }

    Ok(listener)
}

/// State shared by one receive task.
struct ReceiveContext {
    address: String,
    handlers: Arc<HandlerChain>,
    decoder: Arc<Decoder>,
    sink: Arc<dyn FatalSink>,
    shutdown: Arc<AtomicBool>,
    buffer_size: usize,
}

impl ReceiveContext {
    /// Decode one unit and run it through the chain.
    fn deliver(&self, data: &[u8], source: MessageSource) {
        tracing::trace!(source = %source, bytes = data.len(), "Received syslog packet");
        let message = self.decoder.decode(data, Utc::now(), source);
        self.handlers.dispatch(Some(message));
    }

    /// Report a loop error unless the server is shutting down.
    fn fail(&self, error: ServerError) {
        if self.shutdown.load(Ordering::SeqCst) {
            tracing::debug!(address = %self.address, error = %error, "Listener stopped");
        } else {
            self.sink.report(error);
        }
    }

    fn read_error(&self, source: std::io::Error) -> ServerError {
        ServerError::Read {
            address: self.address.clone(),
            source,
        }
    }

    fn accept_error(&self, source: std::io::Error) -> ServerError {
        ServerError::Accept {
            address: self.address.clone(),
            source,
        }
    }
}

/// Outcome of reading one unit from a stream connection.
enum ReadOutcome {
    Data(Vec<u8>),
    Empty,
    Closed,
    Failed(std::io::Error),
}

/// Read once from an accepted connection, or give up when the listener closes.
async fn read_unit<S>(
    stream: &mut S,
    buffer_size: usize,
    closed: &mut watch::Receiver<bool>,
) -> ReadOutcome
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    tokio::select! {
        _ = closed.changed() => ReadOutcome::Closed,
        result = stream.read(&mut buf) => match result {
            Ok(0) => ReadOutcome::Empty,
            Ok(len) => {
                buf.truncate(len);
                ReadOutcome::Data(buf)
            }
            Err(e) => ReadOutcome::Failed(e),
        },
    }
}

async fn run_datagram(socket: UdpSocket, ctx: ReceiveContext, mut closed: watch::Receiver<bool>) {
    loop {
        let mut buf = vec![0u8; ctx.buffer_size];
        tokio::select! {
            _ = closed.changed() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((0, _)) => {}
                Ok((len, addr)) => ctx.deliver(&buf[..len], MessageSource::Network(addr)),
                Err(e) => {
                    ctx.fail(ctx.read_error(e));
                    break;
                }
            },
        }
    }
}

async fn run_tcp(listener: TcpListener, ctx: ReceiveContext, mut closed: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            _ = closed.changed() => break,
            result = listener.accept() => result,
        };

        let (mut stream, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                ctx.fail(ctx.accept_error(e));
                break;
            }
        };

        tracing::debug!(peer = %addr, "TCP connection accepted");

        match read_unit(&mut stream, ctx.buffer_size, &mut closed).await {
            ReadOutcome::Data(data) => ctx.deliver(&data, MessageSource::Network(addr)),
            ReadOutcome::Empty => {}
            ReadOutcome::Closed => break,
            ReadOutcome::Failed(e) => {
                ctx.fail(ctx.read_error(e));
                break;
            }
        }
    }
}

async fn run_unix(listener: UnixListener, ctx: ReceiveContext, mut closed: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            _ = closed.changed() => break,
            result = listener.accept() => result,
        };

        let mut stream = match accepted {
            Ok((stream, _addr)) => stream,
            Err(e) => {
                ctx.fail(ctx.accept_error(e));
                break;
            }
        };

        tracing::debug!(address = %ctx.address, "Unix connection accepted");

        match read_unit(&mut stream, ctx.buffer_size, &mut closed).await {
            ReadOutcome::Data(data) => ctx.deliver(&data, MessageSource::Unix),
            ReadOutcome::Empty => {}
            ReadOutcome::Closed => break,
            ReadOutcome::Failed(e) => {
                ctx.fail(ctx.read_error(e));
                break;
            }
        }
    }
}
