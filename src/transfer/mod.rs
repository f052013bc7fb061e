/// The transfer engine driving the task queue.
pub mod engine;
/// Preorder queue building.
pub mod queue;
/// Request routing between the local executor and the remote peer.
pub mod router;

pub use engine::{
    Action, ErrorKind, FileTransfer, FinishCallback, TransferError, TransferHandle, TransferKind,
    TransferUi, ACTION_ABORT, ACTION_REPLACE, ACTION_REPLACE_ALL, ACTION_SKIP, ACTION_SKIP_ALL,
    CANCEL_TIMEOUT,
};
pub use queue::{BuiltQueue, QueueBuilder, QueueError, TaskList, TransferItem, TransferTask};
pub use router::{ProducerProxy, RequestRouter, RouterError, RoutedReply, TaskTarget};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::fs::FileExecutor;
use crate::net::{Channel, ChannelError};
use crate::proto::{self, FileError, FileReply, FileRequest, ProtoError};

/// Session failure while serving file requests.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

/// Serves a peer's file requests against the local filesystem until the
/// channel closes. This is the host side of a file-transfer session.
pub async fn serve_files<T>(
    mut channel: Channel<T>,
    mut executor: FileExecutor,
) -> Result<(), ServeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match channel.recv().await {
            Ok(frame) => frame,
            Err(ChannelError::Disconnected) => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        let reply = match proto::decode::<FileRequest>(&frame) {
            Ok(request) => executor.execute(&request),
            Err(error) => {
                warn!(%error, "invalid file request");
                FileReply::status(FileError::InvalidRequest)
            }
        };
        channel.send(&proto::encode(&reply)?).await?;
    }
}
