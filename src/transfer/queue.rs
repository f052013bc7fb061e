use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;

use super::router::{ProducerProxy, RequestRouter, RoutedReply, TaskTarget};
use crate::proto::{FileError, FileList, FileReplyData, FileRequest};

/// Top-level selection handed to a transfer: one name under the source root.
#[derive(Clone, Debug)]
pub struct TransferItem {
    pub name: String,
    pub is_directory: bool,
}

/// One unit of transfer work. Directories carry a zero size.
#[derive(Clone, Debug)]
pub struct TransferTask {
    pub source_path: String,
    pub target_path: String,
    pub size: u64,
    pub is_directory: bool,
    pub overwrite: bool,
}

/// Ordered task queue, consumed front to back.
pub type TaskList = VecDeque<TransferTask>;

/// Finished queue: the ordered tasks and the byte total of all files.
#[derive(Debug)]
pub struct BuiltQueue {
    pub tasks: TaskList,
    pub total_size: u64,
}

/// Building aborted; carries the underlying filesystem code.
#[derive(Debug, Error)]
#[error("queue building failed: {code:?}")]
pub struct QueueError {
    pub code: FileError,
}

/// Joins wire paths with a forward slash.
pub fn join_paths(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Walks the selected items in preorder and produces the task queue.
///
/// Directory items yield a directory-creation task followed by their
/// children; file sizes come from the directory listings, with the source
/// root's listing covering the top-level items.
pub struct QueueBuilder {
    router: RequestRouter,
    source: TaskTarget,
    proxy: Arc<ProducerProxy>,
    replies: mpsc::UnboundedReceiver<RoutedReply>,
    tasks: Vec<TransferTask>,
    total_size: u64,
}

impl QueueBuilder {
    pub fn new(router: RequestRouter, source: TaskTarget) -> Self {
        let (proxy, replies) = ProducerProxy::new();
        Self {
            router,
            source,
            proxy,
            replies,
            tasks: Vec::new(),
            total_size: 0,
        }
    }

    pub async fn build(
        mut self,
        source_root: &str,
        target_root: &str,
        items: &[TransferItem],
    ) -> Result<BuiltQueue, QueueError> {
        let result = self.walk_items(source_root, target_root, items).await;
        self.proxy.detach();
        result.map(|()| BuiltQueue {
            tasks: self.tasks.into(),
            total_size: self.total_size,
        })
    }

    async fn walk_items(
        &mut self,
        source_root: &str,
        target_root: &str,
        items: &[TransferItem],
    ) -> Result<(), QueueError> {
        let listing = self.list_directory(source_root).await?;
        for item in items {
            let source_path = join_paths(source_root, &item.name);
            let target_path = join_paths(target_root, &item.name);
            if item.is_directory {
                self.push_directory(source_path.clone(), target_path.clone());
                self.walk(source_path, target_path).await?;
            } else {
                let size = listing
                    .items
                    .iter()
                    .find(|entry| !entry.is_directory && entry.name == item.name)
                    .map(|entry| entry.size)
                    .ok_or(QueueError {
                        code: FileError::PathNotFound,
                    })?;
                self.push_file(source_path, target_path, size);
            }
        }
        Ok(())
    }

    fn walk(&mut self, source: String, target: String) -> BoxFuture<'_, Result<(), QueueError>> {
        async move {
            let listing = self.list_directory(&source).await?;
            for entry in listing.items {
                let source_path = join_paths(&source, &entry.name);
                let target_path = join_paths(&target, &entry.name);
                if entry.is_directory {
                    self.push_directory(source_path.clone(), target_path.clone());
                    self.walk(source_path, target_path).await?;
                } else {
                    self.push_file(source_path, target_path, entry.size);
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn push_directory(&mut self, source_path: String, target_path: String) {
        self.tasks.push(TransferTask {
            source_path,
            target_path,
            size: 0,
            is_directory: true,
            overwrite: false,
        });
    }

    fn push_file(&mut self, source_path: String, target_path: String, size: u64) {
        self.total_size += size;
        self.tasks.push(TransferTask {
            source_path,
            target_path,
            size,
            is_directory: false,
            overwrite: false,
        });
    }

    async fn list_directory(&mut self, path: &str) -> Result<FileList, QueueError> {
        self.router
            .submit(
                self.source,
                FileRequest::FileList {
                    path: path.to_owned(),
                },
                &self.proxy,
            )
            .map_err(|_| QueueError {
                code: FileError::Unknown,
            })?;
        let routed = self.replies.recv().await.ok_or(QueueError {
            code: FileError::Unknown,
        })?;
        if !routed.reply.is_success() {
            return Err(QueueError {
                code: routed.reply.error_code,
            });
        }
        match routed.reply.data {
            FileReplyData::FileList(list) => Ok(list),
            _ => Err(QueueError {
                code: FileError::Unknown,
            }),
        }
    }
}
