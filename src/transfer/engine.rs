//! The transfer engine.
//!
//! Drives the task queue front to back over the request router. For a file
//! task the exchange is download → upload → packet request ⇄ packet until the
//! final packet; a directory task is a single create-directory exchange.
//! Errors resolve through the per-kind action memory or a question to the UI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::queue::{QueueBuilder, TaskList, TransferItem};
use super::router::{ProducerProxy, RequestRouter, RoutedReply, TaskTarget};
use crate::proto::{
    FileError, FileReply, FileReplyData, FileRequest, PACKET_REQUEST_CANCEL,
    PACKET_REQUEST_NO_FLAGS,
};
use crate::MAX_FILE_PACKET_SIZE;

/// How long a canceled transfer waits for the peer before forcing the finish.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Direction of a transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferKind {
    /// Source is the remote peer, target is the local filesystem.
    Downloader,
    /// Source is the local filesystem, target is the remote peer.
    Uploader,
}

/// Classification of a transfer failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Queue,
    CreateDirectory,
    CreateFile,
    OpenFile,
    AlreadyExists,
    WriteFile,
    ReadFile,
    Other,
}

/// Resolution for a transfer error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Ask,
    Abort,
    Skip,
    SkipAll,
    Replace,
    ReplaceAll,
}

/// Action bit: abort the whole transfer.
pub const ACTION_ABORT: u32 = 0b0000_0001;
/// Action bit: skip the current task.
pub const ACTION_SKIP: u32 = 0b0000_0010;
/// Action bit: skip, and remember for this error kind.
pub const ACTION_SKIP_ALL: u32 = 0b0000_0100;
/// Action bit: redo the current task with overwrite.
pub const ACTION_REPLACE: u32 = 0b0000_1000;
/// Action bit: replace, and remember for this error kind.
pub const ACTION_REPLACE_ALL: u32 = 0b0001_0000;

/// A transfer failure surfaced to the UI.
#[derive(Clone, Debug)]
pub struct TransferError {
    pub kind: ErrorKind,
    pub code: FileError,
    pub path: String,
}

impl TransferError {
    /// The fixed set of actions a user may pick for this error kind.
    pub fn available_actions(&self) -> u32 {
        match self.kind {
            ErrorKind::AlreadyExists => {
                ACTION_ABORT | ACTION_SKIP | ACTION_SKIP_ALL | ACTION_REPLACE | ACTION_REPLACE_ALL
            }
            ErrorKind::Queue | ErrorKind::Other => ACTION_ABORT,
            _ => ACTION_ABORT | ACTION_SKIP | ACTION_SKIP_ALL,
        }
    }

    pub fn default_action(&self) -> Action {
        Action::Ask
    }
}

/// Callbacks from the engine to whatever renders progress.
pub trait TransferUi: Send + Sync + 'static {
    fn on_started(&self);
    fn on_finished(&self);
    fn set_current_item(&self, source_path: &str, target_path: &str);
    /// Integer percentages; called only when one of them changes.
    fn set_current_progress(&self, total_pct: u32, task_pct: u32);
    /// Asks for a decision; answer arrives via [`TransferHandle::set_action`].
    fn error_occurred(&self, error: &TransferError);
}

/// Detachable indirection in front of the UI; calls after detach are no-ops.
struct UiProxy {
    detached: AtomicBool,
    ui: Arc<dyn TransferUi>,
}

impl UiProxy {
    fn new(ui: Arc<dyn TransferUi>) -> Self {
        Self {
            detached: AtomicBool::new(false),
            ui,
        }
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn live(&self) -> Option<&dyn TransferUi> {
        if self.detached.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.ui.as_ref())
        }
    }
}

enum ControlEvent {
    Stop,
    Action(ErrorKind, Action),
}

/// Control surface handed to the UI side.
#[derive(Clone)]
pub struct TransferHandle {
    control: mpsc::UnboundedSender<ControlEvent>,
}

impl TransferHandle {
    /// Stops the transfer: during queue building the builder is discarded;
    /// during transfer the cancel watchdog is armed.
    pub fn stop(&self) {
        let _ = self.control.send(ControlEvent::Stop);
    }

    /// Resolves a previously surfaced error.
    pub fn set_action(&self, kind: ErrorKind, action: Action) {
        let _ = self.control.send(ControlEvent::Action(kind, action));
    }
}

/// Invoked exactly once when the transfer ends, however it ends.
pub type FinishCallback = Box<dyn FnOnce() + Send + 'static>;

/// The transfer engine. Construct, optionally seed the action memory, then
/// [`start`](FileTransfer::start).
pub struct FileTransfer {
    source: TaskTarget,
    target: TaskTarget,
    router: RequestRouter,
    ui: UiProxy,
    proxy: Arc<ProducerProxy>,
    replies: mpsc::UnboundedReceiver<RoutedReply>,
    control: mpsc::UnboundedReceiver<ControlEvent>,
    tasks: TaskList,
    total_size: u64,
    total_transfered: u64,
    task_transfered: u64,
    total_pct: u32,
    task_pct: u32,
    actions: HashMap<ErrorKind, Action>,
    canceled: bool,
    finished: bool,
}

impl FileTransfer {
    pub fn new(
        kind: TransferKind,
        router: RequestRouter,
        ui: Arc<dyn TransferUi>,
    ) -> (Self, TransferHandle) {
        let (source, target) = match kind {
            TransferKind::Downloader => (TaskTarget::Remote, TaskTarget::Local),
            TransferKind::Uploader => (TaskTarget::Local, TaskTarget::Remote),
        };
        let (proxy, replies) = ProducerProxy::new();
        let (control_sender, control) = mpsc::unbounded_channel();
        (
            Self {
                source,
                target,
                router,
                ui: UiProxy::new(ui),
                proxy,
                replies,
                control,
                tasks: TaskList::new(),
                total_size: 0,
                total_transfered: 0,
                task_transfered: 0,
                total_pct: 0,
                task_pct: 0,
                actions: HashMap::new(),
                canceled: false,
                finished: false,
            },
            TransferHandle {
                control: control_sender,
            },
        )
    }

    /// Seeds the action memory, bypassing the UI for this error kind.
    pub fn set_action_for_error_type(&mut self, kind: ErrorKind, action: Action) {
        self.actions.insert(kind, action);
    }

    /// Builds the queue and runs the transfer on a spawned task.
    pub fn start(
        mut self,
        source_root: String,
        target_root: String,
        items: Vec<TransferItem>,
        finish: FinishCallback,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(&source_root, &target_root, &items).await;
            finish();
        })
    }

    async fn run(&mut self, source_root: &str, target_root: &str, items: &[TransferItem]) {
        if let Some(ui) = self.ui.live() {
            ui.on_started();
        }

        let build = QueueBuilder::new(self.router.clone(), self.source).build(
            source_root,
            target_root,
            items,
        );
        tokio::pin!(build);
        let built = loop {
            tokio::select! {
                result = &mut build => break Some(result),
                event = self.control.recv() => match event {
                    Some(ControlEvent::Stop) | None => break None,
                    Some(ControlEvent::Action(..)) => {}
                },
            }
        };

        match built {
            None => {
                // Stopped while building: discard the queue and finish.
                self.finish();
                return;
            }
            Some(Err(error)) => {
                self.on_error(ErrorKind::Queue, error.code, String::new());
            }
            Some(Ok(queue)) => {
                self.tasks = queue.tasks;
                self.total_size = queue.total_size;
                if self.tasks.is_empty() {
                    self.finish();
                    return;
                }
                self.do_front_task(false);
            }
        }

        let watchdog = tokio::time::sleep(Duration::from_secs(86_400));
        tokio::pin!(watchdog);
        while !self.finished {
            tokio::select! {
                routed = self.replies.recv() => match routed {
                    Some(routed) => self.handle_reply(routed),
                    None => self.finish(),
                },
                event = self.control.recv() => match event {
                    Some(ControlEvent::Stop) => {
                        if !self.canceled {
                            self.canceled = true;
                            watchdog
                                .as_mut()
                                .reset(tokio::time::Instant::now() + CANCEL_TIMEOUT);
                        }
                    }
                    Some(ControlEvent::Action(kind, action)) => self.apply_action(kind, action),
                    None => self.finish(),
                },
                () = &mut watchdog, if self.canceled => {
                    // The peer did not honor the cancel in time.
                    self.finish();
                }
            }
        }
    }

    fn handle_reply(&mut self, routed: RoutedReply) {
        if self.tasks.is_empty() {
            return;
        }
        if routed.target == self.target {
            self.target_reply(&routed.request, &routed.reply);
        } else {
            self.source_reply(&routed.request, routed.reply);
        }
    }

    fn target_reply(&mut self, request: &FileRequest, reply: &FileReply) {
        match request {
            FileRequest::CreateDirectory { .. } => {
                if reply.error_code == FileError::Success
                    || reply.error_code == FileError::PathAlreadyExists
                {
                    self.do_next_task();
                    return;
                }
                let path = self.front_target_path();
                self.on_error(ErrorKind::CreateDirectory, reply.error_code, path);
            }
            FileRequest::Upload { .. } => {
                if !reply.is_success() {
                    let kind = if reply.error_code == FileError::PathAlreadyExists {
                        ErrorKind::AlreadyExists
                    } else {
                        ErrorKind::CreateFile
                    };
                    let path = self.front_target_path();
                    self.on_error(kind, reply.error_code, path);
                    return;
                }
                self.submit_or_fail(
                    self.source,
                    FileRequest::PacketRequest {
                        flags: PACKET_REQUEST_NO_FLAGS,
                    },
                );
            }
            FileRequest::Packet(packet) => {
                if !reply.is_success() {
                    let path = self.front_target_path();
                    self.on_error(ErrorKind::WriteFile, reply.error_code, path);
                    return;
                }
                self.account_progress();
                if packet.is_last() {
                    self.do_next_task();
                    return;
                }
                let flags = if self.canceled {
                    PACKET_REQUEST_CANCEL
                } else {
                    PACKET_REQUEST_NO_FLAGS
                };
                self.submit_or_fail(self.source, FileRequest::PacketRequest { flags });
            }
            _ => self.on_error(ErrorKind::Other, FileError::Unknown, String::new()),
        }
    }

    fn source_reply(&mut self, request: &FileRequest, reply: FileReply) {
        match request {
            FileRequest::Download { .. } => {
                if !reply.is_success() {
                    let path = self.front_source_path();
                    self.on_error(ErrorKind::OpenFile, reply.error_code, path);
                    return;
                }
                let (target_path, overwrite) = match self.tasks.front() {
                    Some(task) => (task.target_path.clone(), task.overwrite),
                    None => return,
                };
                self.submit_or_fail(
                    self.target,
                    FileRequest::Upload {
                        path: target_path,
                        overwrite,
                    },
                );
            }
            FileRequest::PacketRequest { .. } => {
                if !reply.is_success() {
                    let path = self.front_source_path();
                    self.on_error(ErrorKind::ReadFile, reply.error_code, path);
                    return;
                }
                match reply.data {
                    FileReplyData::Packet(packet) => {
                        self.submit_or_fail(self.target, FileRequest::Packet(packet));
                    }
                    _ => self.on_error(ErrorKind::Other, FileError::Unknown, String::new()),
                }
            }
            _ => self.on_error(ErrorKind::Other, FileError::Unknown, String::new()),
        }
    }

    fn account_progress(&mut self) {
        let task_size = match self.tasks.front() {
            Some(task) => task.size,
            None => return,
        };
        if task_size == 0 || self.total_size == 0 {
            return;
        }
        let increment = (task_size - self.task_transfered).min(MAX_FILE_PACKET_SIZE as u64);
        self.task_transfered += increment;
        self.total_transfered += increment;

        let task_pct = (self.task_transfered * 100 / task_size) as u32;
        let total_pct = (self.total_transfered * 100 / self.total_size) as u32;
        if task_pct != self.task_pct || total_pct != self.total_pct {
            self.task_pct = task_pct;
            self.total_pct = total_pct;
            if let Some(ui) = self.ui.live() {
                ui.set_current_progress(total_pct, task_pct);
            }
        }
    }

    fn do_front_task(&mut self, overwrite: bool) {
        self.task_pct = 0;
        self.task_transfered = 0;

        let (source_path, target_path, is_directory) = match self.tasks.front_mut() {
            Some(task) => {
                task.overwrite = overwrite;
                (
                    task.source_path.clone(),
                    task.target_path.clone(),
                    task.is_directory,
                )
            }
            None => {
                self.finish();
                return;
            }
        };

        if let Some(ui) = self.ui.live() {
            ui.set_current_item(&source_path, &target_path);
        }

        if is_directory {
            self.submit_or_fail(self.target, FileRequest::CreateDirectory { path: target_path });
        } else {
            self.submit_or_fail(self.source, FileRequest::Download { path: source_path });
        }
    }

    fn do_next_task(&mut self) {
        if self.canceled {
            self.tasks.clear();
        }
        // The finished task is removed only after its confirmed completion.
        self.tasks.pop_front();
        if self.tasks.is_empty() {
            self.finish();
            return;
        }
        self.do_front_task(false);
    }

    fn on_error(&mut self, kind: ErrorKind, code: FileError, path: String) {
        if let Some(action) = self.actions.get(&kind).copied() {
            self.apply_action(kind, action);
            return;
        }
        let error = TransferError { kind, code, path };
        match error.default_action() {
            Action::Ask => {
                if let Some(ui) = self.ui.live() {
                    ui.error_occurred(&error);
                } else {
                    self.finish();
                }
            }
            action => self.apply_action(kind, action),
        }
    }

    fn apply_action(&mut self, kind: ErrorKind, action: Action) {
        match action {
            Action::Abort => self.finish(),
            Action::Replace | Action::ReplaceAll => {
                if action == Action::ReplaceAll {
                    self.actions.insert(kind, action);
                }
                self.do_front_task(true);
            }
            Action::Skip | Action::SkipAll => {
                if action == Action::SkipAll {
                    self.actions.insert(kind, action);
                }
                self.do_next_task();
            }
            Action::Ask => {}
        }
    }

    fn submit_or_fail(&mut self, target: TaskTarget, request: FileRequest) {
        if let Err(error) = self.router.submit(target, request, &self.proxy) {
            warn!(%error, "request routing failed");
            self.finish();
        }
    }

    fn front_source_path(&self) -> String {
        self.tasks
            .front()
            .map(|task| task.source_path.clone())
            .unwrap_or_default()
    }

    fn front_target_path(&self) -> String {
        self.tasks
            .front()
            .map(|task| task.target_path.clone())
            .unwrap_or_default()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.proxy.detach();
        if let Some(ui) = self.ui.live() {
            ui.on_finished();
        }
        self.ui.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileExecutor;
    use crate::net::Channel;
    use crate::transfer::serve_files;
    use std::fs;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum UiEvent {
        Started,
        Finished,
        Item(String, String),
        Progress(u32, u32),
        Error(ErrorKind, FileError),
    }

    struct RecordingUi {
        events: Mutex<Vec<UiEvent>>,
        errors: mpsc::UnboundedSender<TransferError>,
    }

    impl RecordingUi {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransferError>) {
            let (errors, error_rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    events: Mutex::new(Vec::new()),
                    errors,
                }),
                error_rx,
            )
        }

        fn record(&self, event: UiEvent) {
            self.events.lock().expect("ui lock").push(event);
        }

        fn events(&self) -> Vec<UiEvent> {
            self.events.lock().expect("ui lock").clone()
        }
    }

    impl TransferUi for RecordingUi {
        fn on_started(&self) {
            self.record(UiEvent::Started);
        }
        fn on_finished(&self) {
            self.record(UiEvent::Finished);
        }
        fn set_current_item(&self, source_path: &str, target_path: &str) {
            self.record(UiEvent::Item(source_path.into(), target_path.into()));
        }
        fn set_current_progress(&self, total_pct: u32, task_pct: u32) {
            self.record(UiEvent::Progress(total_pct, task_pct));
        }
        fn error_occurred(&self, error: &TransferError) {
            self.record(UiEvent::Error(error.kind, error.code));
            let _ = self.errors.send(error.clone());
        }
    }

    /// Router whose "remote" end is a file-serving peer over a duplex channel.
    fn test_router() -> RequestRouter {
        let (near, far) = tokio::io::duplex(1024 * 1024);
        tokio::spawn(serve_files(
            Channel::from_transport(far, "far"),
            FileExecutor::new(),
        ));
        RequestRouter::new(FileExecutor::new(), Channel::from_transport(near, "near"))
    }

    fn finish_flag() -> (
        FinishCallback,
        tokio::sync::oneshot::Receiver<()>,
        Arc<std::sync::atomic::AtomicUsize>,
    ) {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let counted = Arc::clone(&count);
        let callback = Box::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });
        (callback, rx, count)
    }

    fn item(name: &str, is_directory: bool) -> TransferItem {
        TransferItem {
            name: name.into(),
            is_directory,
        }
    }

    #[tokio::test]
    async fn downloads_a_tree_with_full_progress() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), vec![1u8; 10]).expect("write");
        fs::create_dir(remote.path().join("dir")).expect("mkdir");
        let big_len = 2 * MAX_FILE_PACKET_SIZE + 5;
        fs::write(remote.path().join("dir/b.bin"), vec![2u8; big_len]).expect("write");

        let (ui, _errors) = RecordingUi::new();
        let (engine, _handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui.clone());
        let (callback, finished, count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false), item("dir", true)],
            callback,
        );
        finished.await.expect("finish");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Content arrived intact.
        assert_eq!(
            fs::read(local.path().join("a.bin")).expect("read"),
            vec![1u8; 10]
        );
        assert_eq!(
            fs::read(local.path().join("dir/b.bin")).expect("read").len(),
            big_len
        );

        let events = ui.events();
        let items = events
            .iter()
            .filter(|event| matches!(event, UiEvent::Item(..)))
            .count();
        assert_eq!(items, 3);

        // Progress is monotone and ends at 100 percent.
        let progress: Vec<(u32, u32)> = events
            .iter()
            .filter_map(|event| match event {
                UiEvent::Progress(total, task) => Some((*total, *task)),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        assert_eq!(progress.last().map(|(total, _)| *total), Some(100));
        let mut last_total = 0;
        for (total, _) in &progress {
            assert!(*total >= last_total);
            last_total = *total;
        }
        assert_eq!(events.last(), Some(&UiEvent::Finished));
    }

    #[tokio::test]
    async fn collision_asks_once_then_replace_all_is_remembered() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), b"fresh a").expect("write");
        fs::write(remote.path().join("b.bin"), b"fresh b").expect("write");
        fs::write(local.path().join("a.bin"), b"stale").expect("write");
        fs::write(local.path().join("b.bin"), b"stale").expect("write");

        let (ui, mut errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui.clone());
        let (callback, finished, _count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false), item("b.bin", false)],
            callback,
        );

        let error = errors.recv().await.expect("collision surfaced");
        assert_eq!(error.kind, ErrorKind::AlreadyExists);
        assert_eq!(error.code, FileError::PathAlreadyExists);
        assert!(error.available_actions() & ACTION_REPLACE_ALL != 0);
        handle.set_action(ErrorKind::AlreadyExists, Action::ReplaceAll);

        finished.await.expect("finish");

        // Only the first collision reached the UI; the second auto-resolved.
        let asked = ui
            .events()
            .iter()
            .filter(|event| matches!(event, UiEvent::Error(..)))
            .count();
        assert_eq!(asked, 1);
        assert_eq!(
            fs::read(local.path().join("a.bin")).expect("read"),
            b"fresh a"
        );
        assert_eq!(
            fs::read(local.path().join("b.bin")).expect("read"),
            b"fresh b"
        );
    }

    #[tokio::test]
    async fn skip_leaves_existing_file_untouched() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), b"fresh").expect("write");
        fs::write(local.path().join("a.bin"), b"stale").expect("write");

        let (ui, mut errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui);
        let (callback, finished, _count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false)],
            callback,
        );

        errors.recv().await.expect("collision surfaced");
        handle.set_action(ErrorKind::AlreadyExists, Action::Skip);
        finished.await.expect("finish");
        assert_eq!(fs::read(local.path().join("a.bin")).expect("read"), b"stale");
    }

    #[tokio::test]
    async fn seeded_action_memory_bypasses_the_ui() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), b"fresh").expect("write");
        fs::write(local.path().join("a.bin"), b"stale").expect("write");

        let (ui, _errors) = RecordingUi::new();
        let (mut engine, _handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui.clone());
        engine.set_action_for_error_type(ErrorKind::AlreadyExists, Action::ReplaceAll);
        let (callback, finished, _count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false)],
            callback,
        );
        finished.await.expect("finish");

        assert!(ui
            .events()
            .iter()
            .all(|event| !matches!(event, UiEvent::Error(..))));
        assert_eq!(fs::read(local.path().join("a.bin")).expect("read"), b"fresh");
    }

    #[tokio::test]
    async fn abort_finishes_immediately() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), b"fresh").expect("write");
        fs::write(remote.path().join("b.bin"), b"more").expect("write");
        fs::write(local.path().join("a.bin"), b"stale").expect("write");

        let (ui, mut errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui);
        let (callback, finished, count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false), item("b.bin", false)],
            callback,
        );

        errors.recv().await.expect("collision surfaced");
        handle.set_action(ErrorKind::AlreadyExists, Action::Abort);
        finished.await.expect("finish");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!local.path().join("b.bin").exists());
    }

    #[tokio::test]
    async fn stop_mid_transfer_finishes_once_with_no_trailing_ui_calls() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        // Large enough that many packet exchanges happen.
        fs::write(
            remote.path().join("large.bin"),
            vec![9u8; 64 * MAX_FILE_PACKET_SIZE],
        )
        .expect("write");

        let (ui, _errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui.clone());
        let (callback, finished, count) = finish_flag();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("large.bin", false)],
            callback,
        );

        // Let the transfer get going, then pull the plug.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        tokio::time::timeout(CANCEL_TIMEOUT + Duration::from_secs(1), finished)
            .await
            .expect("finish within the watchdog window")
            .expect("finish");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let events = ui.events();
        assert_eq!(events.last(), Some(&UiEvent::Finished));

        // Nothing may reach the UI after the finish notification.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ui.events(), events);
    }

    #[tokio::test]
    async fn stop_during_queue_building_discards_the_builder() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(remote.path().join("a.bin"), b"data").expect("write");

        let (ui, _errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui);
        let (callback, finished, count) = finish_flag();
        // Stop before the engine starts; the first control poll sees it.
        handle.stop();
        engine.start(
            remote.path().to_string_lossy().into_owned(),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false)],
            callback,
        );
        finished.await.expect("finish");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queue_failure_surfaces_a_queue_error() {
        let local = tempfile::tempdir().expect("tempdir");
        let (ui, mut errors) = RecordingUi::new();
        let (engine, handle) =
            FileTransfer::new(TransferKind::Downloader, test_router(), ui);
        let (callback, finished, _count) = finish_flag();
        engine.start(
            String::from("/no/such/source"),
            local.path().to_string_lossy().into_owned(),
            vec![item("a.bin", false)],
            callback,
        );

        let error = errors.recv().await.expect("queue error");
        assert_eq!(error.kind, ErrorKind::Queue);
        assert_eq!(error.available_actions(), ACTION_ABORT);
        handle.set_action(ErrorKind::Queue, Action::Abort);
        finished.await.expect("finish");
    }

    #[test]
    fn action_tables_per_error_kind() {
        let collision = TransferError {
            kind: ErrorKind::AlreadyExists,
            code: FileError::PathAlreadyExists,
            path: String::new(),
        };
        assert_eq!(
            collision.available_actions(),
            ACTION_ABORT | ACTION_SKIP | ACTION_SKIP_ALL | ACTION_REPLACE | ACTION_REPLACE_ALL
        );
        assert_eq!(collision.default_action(), Action::Ask);

        let queue = TransferError {
            kind: ErrorKind::Queue,
            code: FileError::Unknown,
            path: String::new(),
        };
        assert_eq!(queue.available_actions(), ACTION_ABORT);
        assert_eq!(queue.default_action(), Action::Ask);

        let read = TransferError {
            kind: ErrorKind::ReadFile,
            code: FileError::FileReadError,
            path: String::new(),
        };
        assert_eq!(
            read.available_actions(),
            ACTION_ABORT | ACTION_SKIP | ACTION_SKIP_ALL
        );
    }

    #[tokio::test]
    async fn uploader_pushes_local_tree_to_remote() {
        let remote = tempfile::tempdir().expect("tempdir");
        let local = tempfile::tempdir().expect("tempdir");
        fs::write(local.path().join("up.bin"), vec![4u8; MAX_FILE_PACKET_SIZE + 1])
            .expect("write");

        let (ui, _errors) = RecordingUi::new();
        let (engine, _handle) =
            FileTransfer::new(TransferKind::Uploader, test_router(), ui);
        let (callback, finished, _count) = finish_flag();
        engine.start(
            local.path().to_string_lossy().into_owned(),
            remote.path().to_string_lossy().into_owned(),
            vec![item("up.bin", false)],
            callback,
        );
        finished.await.expect("finish");
        assert_eq!(
            fs::read(remote.path().join("up.bin")).expect("read").len(),
            MAX_FILE_PACKET_SIZE + 1
        );
    }
}
