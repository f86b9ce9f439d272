//! The inspector server
//!
//! Owns the listeners, the client set, the dispatcher, and the subscription
//! manager. `start` binds the configured transports and begins accepting;
//! `stop` cancels the listeners, closes every client, tears down every
//! subscription on the adapter context, and shuts the context down. `stop`
//! is idempotent.
//!
//! A server is one-shot: construct, `start`, `stop`. Hosts that need to
//! serve again construct a new one; construction is cheap.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use spyglass_adapter::DatabaseAdapter;
use spyglass_protocol::{Request, RequestKind};

use crate::client::{run_connection, ClientHandle, ConnectionHooks};
use crate::config::{ServerConfig, TransportMode};
use crate::context::AdapterContext;
use crate::dispatch::Dispatcher;
use crate::listener::{BoxedStream, Listener, TcpServerListener};
use crate::subscription::SubscriptionManager;
use crate::{Result, ServerError};

/// The in-process inspector agent
///
/// The transport is unauthenticated and unencrypted: this is a debug tool.
/// It binds to loopback unless the host configures otherwise.
pub struct Server {
    config: ServerConfig,
    context: Arc<AdapterContext>,
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<SubscriptionManager>,
    clients: Arc<Mutex<HashMap<Uuid, ClientHandle>>>,
    cancel: CancellationToken,
    running: AtomicBool,
    local_addrs: Mutex<Vec<SocketAddr>>,
}

impl Server {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, config: ServerConfig) -> Self {
        let context = AdapterContext::spawn(adapter);
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&context))),
            subscriptions: SubscriptionManager::new(Arc::clone(&context)),
            context,
            clients: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            local_addrs: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Addresses the listeners are bound to (useful with port 0)
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.local_addrs.lock().clone()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    /// Bind the configured transports and start accepting
    pub async fn start(&self) -> Result<Vec<SocketAddr>> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let mut listeners: Vec<Box<dyn Listener>> = Vec::new();

        if matches!(
            self.config.transport_mode,
            TransportMode::NetworkOnly | TransportMode::Both
        ) {
            listeners.push(Box::new(
                TcpServerListener::bind(&self.config.network_address()).await?,
            ));
        }
        if matches!(
            self.config.transport_mode,
            TransportMode::UsbOnly | TransportMode::Both
        ) {
            listeners.push(Box::new(
                TcpServerListener::bind(&self.config.usb_address()).await?,
            ));
        }

        self.start_with_listeners(listeners).await?;
        Ok(self.local_addrs())
    }

    /// Start accepting from caller-provided listeners
    ///
    /// The seam for custom transports and for tests.
    pub async fn start_with_listeners(&self, listeners: Vec<Box<dyn Listener>>) -> Result<()> {
        if listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        warn!("inspector agent running: the protocol is unauthenticated and meant for debug builds only");
        if let Some(name) = &self.config.service_name {
            info!(service = %name, "discovery may advertise this agent");
        }

        let mut addrs = self.local_addrs.lock();
        for listener in &listeners {
            if let Some(addr) = listener.local_addr() {
                info!(address = %addr, "inspector listening");
                addrs.push(addr);
            }
        }
        drop(addrs);

        for listener in listeners {
            self.spawn_accept_loop(listener);
        }
        Ok(())
    }

    fn spawn_accept_loop(&self, mut listener: Box<dyn Listener>) {
        let cancel = self.cancel.clone();
        let clients = Arc::clone(&self.clients);
        let dispatcher = Arc::clone(&self.dispatcher);
        let subscriptions = Arc::clone(&self.subscriptions);
        let max_message_bytes = self.config.max_message_bytes;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(stream) => {
                            attach_client(
                                stream,
                                &clients,
                                &dispatcher,
                                &subscriptions,
                                &cancel,
                                max_message_bytes,
                            );
                        }
                        Err(e) => {
                            // Transient accept errors; keep listening
                            error!(error = %e, "accept failed");
                        }
                    }
                }
            }
            debug!("accept loop stopped");
        });
    }

    /// Stop accepting, close every client, tear down every subscription
    ///
    /// Idempotent; completes once the adapter context has drained.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("inspector agent stopping");

        // Listeners and connections first
        self.cancel.cancel();
        let clients: Vec<ClientHandle> = self.clients.lock().values().cloned().collect();
        for client in clients {
            client.close();
        }

        // Then the subscriptions, on the adapter context
        self.subscriptions.teardown_all();

        // Barrier: everything queued above has run once this returns
        let _ = self.context.run(|_| ()).await;
        self.context.shutdown();

        self.clients.lock().clear();
        self.local_addrs.lock().clear();
    }
}

/// Register an accepted stream as a client connection
fn attach_client(
    stream: BoxedStream,
    clients: &Arc<Mutex<HashMap<Uuid, ClientHandle>>>,
    dispatcher: &Arc<Dispatcher>,
    subscriptions: &Arc<SubscriptionManager>,
    cancel: &CancellationToken,
    max_message_bytes: usize,
) {
    let (handle, outbox_rx) = ClientHandle::new(max_message_bytes);
    clients.lock().insert(handle.id(), handle.clone());
    debug!(client_id = %handle.id(), "client attached");

    let hooks = ConnectionHooks {
        on_request: {
            let dispatcher = Arc::clone(dispatcher);
            let subscriptions = Arc::clone(subscriptions);
            Box::new(move |client: &ClientHandle, request: Request| {
                match request.kind {
                    RequestKind::Subscribe | RequestKind::Unsubscribe => {
                        subscriptions.handle(client.clone(), request);
                    }
                    _ => dispatcher.dispatch(client.clone(), request),
                }
            })
        },
        on_disconnect: {
            let clients = Arc::clone(clients);
            let subscriptions = Arc::clone(subscriptions);
            Box::new(move |client: &ClientHandle| {
                clients.lock().remove(&client.id());
                subscriptions.drop_client(client);
                debug!(client_id = %client.id(), "client detached");
            })
        },
    };

    tokio::spawn(run_connection(
        stream,
        handle.clone(),
        outbox_rx,
        hooks,
        cancel.clone(),
    ));
}
