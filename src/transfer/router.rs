use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::warn;

use crate::fs::FileExecutor;
use crate::net::{Channel, ChannelError};
use crate::proto::{self, FileError, FileReply, FileRequest, ProtoError};

/// Which executor a request is addressed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskTarget {
    Local,
    Remote,
}

/// A reply routed back to the producer that issued the request.
#[derive(Debug)]
pub struct RoutedReply {
    pub target: TaskTarget,
    pub request: FileRequest,
    pub reply: FileReply,
}

/// Detachable reply path for one producer.
///
/// Producers and the per-target workers can outlive each other; a worker only
/// ever holds this proxy, and a delivery after `detach` is dropped on the
/// floor rather than reaching a dead producer.
pub struct ProducerProxy {
    detached: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<RoutedReply>>>,
}

impl ProducerProxy {
    /// Creates a proxy and the receiving end the producer listens on.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RoutedReply>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                detached: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
            }),
            receiver,
        )
    }

    /// Stops all further deliveries.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        let mut guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn deliver(&self, reply: RoutedReply) {
        if self.is_detached() {
            return;
        }
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(reply);
        }
    }
}

struct RoutedRequest {
    target: TaskTarget,
    request: FileRequest,
    producer: Arc<ProducerProxy>,
}

/// Submission failed because the target's worker is gone.
#[derive(Debug, Error)]
#[error("request worker for {target:?} is gone")]
pub struct RouterError {
    pub target: TaskTarget,
}

/// Routes file requests to the local executor or the remote peer.
///
/// One serial worker per target preserves FIFO request and reply order for
/// that target; replies reach producers through their proxies.
#[derive(Clone)]
pub struct RequestRouter {
    local: mpsc::UnboundedSender<RoutedRequest>,
    remote: mpsc::UnboundedSender<RoutedRequest>,
}

impl RequestRouter {
    /// Spawns the two workers: `executor` serves LOCAL, `channel` carries
    /// REMOTE exchanges to the authenticated peer.
    pub fn new<T>(executor: FileExecutor, channel: Channel<T>) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (local_sender, local_receiver) = mpsc::unbounded_channel();
        let (remote_sender, remote_receiver) = mpsc::unbounded_channel();
        tokio::spawn(local_worker(executor, local_receiver));
        tokio::spawn(remote_worker(channel, remote_receiver));
        Self {
            local: local_sender,
            remote: remote_sender,
        }
    }

    /// Enqueues a request; the reply arrives through the producer's proxy.
    pub fn submit(
        &self,
        target: TaskTarget,
        request: FileRequest,
        producer: &Arc<ProducerProxy>,
    ) -> Result<(), RouterError> {
        let routed = RoutedRequest {
            target,
            request,
            producer: Arc::clone(producer),
        };
        let sender = match target {
            TaskTarget::Local => &self.local,
            TaskTarget::Remote => &self.remote,
        };
        sender.send(routed).map_err(|_| RouterError { target })
    }
}

async fn local_worker(mut executor: FileExecutor, mut requests: mpsc::UnboundedReceiver<RoutedRequest>) {
    while let Some(routed) = requests.recv().await {
        let reply = executor.execute(&routed.request);
        routed.producer.deliver(RoutedReply {
            target: routed.target,
            request: routed.request,
            reply,
        });
    }
}

async fn remote_worker<T>(mut channel: Channel<T>, mut requests: mpsc::UnboundedReceiver<RoutedRequest>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(routed) = requests.recv().await {
        let reply = match remote_exchange(&mut channel, &routed.request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, "remote file request failed");
                FileReply::status(FileError::Unknown)
            }
        };
        routed.producer.deliver(RoutedReply {
            target: routed.target,
            request: routed.request,
            reply,
        });
    }
}

#[derive(Debug, Error)]
enum ExchangeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

async fn remote_exchange<T>(
    channel: &mut Channel<T>,
    request: &FileRequest,
) -> Result<FileReply, ExchangeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    channel.send(&proto::encode(request)?).await?;
    let frame = channel.recv().await?;
    Ok(proto::decode(&frame)?)
}
