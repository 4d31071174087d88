//! Runs a [`KeepaliveService`] on its own task.
//!
//! The task owns the service and serializes every input: commands from
//! [`KeepaliveHandle`]s, network events from the loader factory, and the
//! timer for the earliest loader deadline.

use http::HeaderMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uplink_protocol::{RequestPriority, ResourceRequest};

use crate::network::NetworkEvent;
use crate::service::KeepaliveService;
use crate::sink::ForwardingEndpoint;
use crate::types::{IsolationKey, KeepaliveError, LoaderId};

type Reply<T> = oneshot::Sender<Result<T, KeepaliveError>>;

enum Command {
    Start {
        request: ResourceRequest,
        sink: ForwardingEndpoint,
        key: IsolationKey,
        reply: Reply<LoaderId>,
    },
    FollowRedirect {
        id: LoaderId,
        removed: Vec<String>,
        modified: HeaderMap,
        reply: Reply<()>,
    },
    SetPriority {
        id: LoaderId,
        priority: RequestPriority,
        reply: Reply<()>,
    },
    SendNow {
        id: LoaderId,
        reply: Reply<()>,
    },
    Cancel {
        id: LoaderId,
        reply: Reply<()>,
    },
    SinkDisconnected {
        id: LoaderId,
        reply: Reply<()>,
    },
    ReconnectSink {
        id: LoaderId,
        sink: ForwardingEndpoint,
        reply: Reply<()>,
    },
    DocumentActivated(IsolationKey),
    DocumentDeactivated(IsolationKey),
}

/// Cloneable front end of a running keepalive service.
#[derive(Clone)]
pub struct KeepaliveHandle {
    commands: mpsc::UnboundedSender<Command>,
    loaders: watch::Receiver<usize>,
    cancel: CancellationToken,
}

/// Moves `service` onto a new task fed by `events`.
///
/// The task stops when the handle's [`shutdown`](KeepaliveHandle::shutdown)
/// is called, or once every handle is dropped and no loader is left.
pub fn spawn_service(
    service: KeepaliveService,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
) -> (KeepaliveHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (count_tx, count_rx) = watch::channel(service.loader_count());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run(service, commands_rx, events, count_tx, cancel.clone()));
    let handle = KeepaliveHandle {
        commands: commands_tx,
        loaders: count_rx,
        cancel,
    };
    (handle, task)
}

async fn run(
    mut service: KeepaliveService,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<NetworkEvent>,
    counts: watch::Sender<usize>,
    cancel: CancellationToken,
) {
    let mut commands_open = true;
    let mut events_open = true;
    info!("keepalive service started");

    loop {
        let deadline = service.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                service.shutdown();
                break;
            }
            cmd = commands.recv(), if commands_open => match cmd {
                Some(cmd) => handle_command(&mut service, &counts, cmd),
                None => {
                    debug!("all keepalive handles dropped");
                    commands_open = false;
                }
            },
            event = events.recv(), if events_open => match event {
                Some(event) => service.dispatch_network_event(event, Instant::now()),
                None => events_open = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                service.fire_due_timers(Instant::now());
            }
            else => break,
        }
        counts.send_replace(service.loader_count());

        if !commands_open && service.loader_count() == 0 {
            break;
        }
    }

    counts.send_replace(0);
    info!("keepalive service stopped");
}

fn handle_command(service: &mut KeepaliveService, counts: &watch::Sender<usize>, cmd: Command) {
    let now = Instant::now();
    match cmd {
        Command::Start {
            request,
            sink,
            key,
            reply,
        } => {
            let result = service.start_loader(request, sink, key, now);
            respond(service, counts, reply, result);
        }
        Command::FollowRedirect {
            id,
            removed,
            modified,
            reply,
        } => {
            let result = service.follow_redirect(id, &removed, &modified, now);
            respond(service, counts, reply, result);
        }
        Command::SetPriority {
            id,
            priority,
            reply,
        } => {
            let result = service.set_priority(id, priority);
            respond(service, counts, reply, result);
        }
        Command::SendNow { id, reply } => {
            let result = service.send_now(id, now);
            respond(service, counts, reply, result);
        }
        Command::Cancel { id, reply } => {
            let result = service.cancel(id);
            respond(service, counts, reply, result);
        }
        Command::SinkDisconnected { id, reply } => {
            let result = service.sink_disconnected(id, now);
            respond(service, counts, reply, result);
        }
        Command::ReconnectSink { id, sink, reply } => {
            let result = service.reconnect_sink(id, sink, now);
            respond(service, counts, reply, result);
        }
        Command::DocumentActivated(key) => service.document_activated(key, now),
        Command::DocumentDeactivated(key) => service.document_deactivated(&key),
    }
}

/// Publishes the loader count before replying so a caller never observes a
/// count older than its own command.
fn respond<T>(
    service: &KeepaliveService,
    counts: &watch::Sender<usize>,
    reply: Reply<T>,
    result: Result<T, KeepaliveError>,
) {
    counts.send_replace(service.loader_count());
    let _ = reply.send(result);
}

impl KeepaliveHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, KeepaliveError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| KeepaliveError::ServiceStopped)?;
        rx.await.map_err(|_| KeepaliveError::ServiceStopped)?
    }

    pub async fn start(
        &self,
        request: ResourceRequest,
        sink: ForwardingEndpoint,
        key: IsolationKey,
    ) -> Result<LoaderId, KeepaliveError> {
        self.request(|reply| Command::Start {
            request,
            sink,
            key,
            reply,
        })
        .await
    }

    pub async fn follow_redirect(
        &self,
        id: LoaderId,
        removed: Vec<String>,
        modified: HeaderMap,
    ) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::FollowRedirect {
            id,
            removed,
            modified,
            reply,
        })
        .await
    }

    pub async fn set_priority(
        &self,
        id: LoaderId,
        priority: RequestPriority,
    ) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::SetPriority { id, priority, reply })
            .await
    }

    pub async fn send_now(&self, id: LoaderId) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::SendNow { id, reply }).await
    }

    pub async fn cancel(&self, id: LoaderId) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    pub async fn sink_disconnected(&self, id: LoaderId) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::SinkDisconnected { id, reply })
            .await
    }

    pub async fn reconnect_sink(
        &self,
        id: LoaderId,
        sink: ForwardingEndpoint,
    ) -> Result<(), KeepaliveError> {
        self.request(|reply| Command::ReconnectSink { id, sink, reply })
            .await
    }

    pub fn document_activated(&self, key: IsolationKey) -> Result<(), KeepaliveError> {
        self.commands
            .send(Command::DocumentActivated(key))
            .map_err(|_| KeepaliveError::ServiceStopped)
    }

    pub fn document_deactivated(&self, key: IsolationKey) -> Result<(), KeepaliveError> {
        self.commands
            .send(Command::DocumentDeactivated(key))
            .map_err(|_| KeepaliveError::ServiceStopped)
    }

    /// Number of live loaders as last published by the service task.
    pub fn loader_count(&self) -> usize {
        *self.loaders.borrow()
    }

    /// Resolves once no loader is left.
    pub async fn wait_idle(&self) -> Result<(), KeepaliveError> {
        let mut loaders = self.loaders.clone();
        loaders
            .wait_for(|n| *n == 0)
            .await
            .map(|_| ())
            .map_err(|_| KeepaliveError::ServiceStopped)
    }

    /// Stops the service task. Live loaders are dropped silently.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
