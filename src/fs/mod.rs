/// File chunking for the per-packet transfer protocol.
pub mod packetizer;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::proto::{
    DriveKind, DriveList, DriveListItem, FileError, FileList, FileListItem, FilePacket,
    FileReply, FileReplyData, FileRequest,
};
use packetizer::{FileDepacketizer, FilePacketizer};

/// Executes [`FileRequest`]s against the local filesystem.
///
/// One executor serves one peer; at most one file is being read and one
/// written at any time, mirroring the one-active-task transfer protocol.
#[derive(Default)]
pub struct FileExecutor {
    packetizer: Option<FilePacketizer>,
    depacketizer: Option<FileDepacketizer>,
}

impl FileExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(&mut self, request: &FileRequest) -> FileReply {
        match request {
            FileRequest::DriveList => drive_list(),
            FileRequest::FileList { path } => file_list(Path::new(path)),
            FileRequest::CreateDirectory { path } => create_directory(Path::new(path)),
            FileRequest::Rename { old_path, new_path } => {
                rename(Path::new(old_path), Path::new(new_path))
            }
            FileRequest::Remove { path } => remove(Path::new(path)),
            FileRequest::Download { path } => self.download(Path::new(path)),
            FileRequest::Upload { path, overwrite } => self.upload(Path::new(path), *overwrite),
            FileRequest::PacketRequest { flags } => self.packet_request(*flags),
            FileRequest::Packet(packet) => self.packet(packet),
        }
    }

    fn download(&mut self, path: &Path) -> FileReply {
        match FilePacketizer::open(path) {
            Ok(packetizer) => {
                self.packetizer = Some(packetizer);
                FileReply::status(FileError::Success)
            }
            Err(_) => FileReply::status(FileError::FileOpenError),
        }
    }

    fn upload(&mut self, path: &Path, overwrite: bool) -> FileReply {
        if !overwrite && path.exists() {
            return FileReply::status(FileError::PathAlreadyExists);
        }
        match FileDepacketizer::create(path, overwrite) {
            Ok(depacketizer) => {
                self.depacketizer = Some(depacketizer);
                FileReply::status(FileError::Success)
            }
            Err(_) => FileReply::status(FileError::FileCreateError),
        }
    }

    fn packet_request(&mut self, flags: u32) -> FileReply {
        let Some(packetizer) = self.packetizer.as_mut() else {
            // The peer asked for data with no open file; poison the exchange.
            warn!("unexpected file packet request");
            return FileReply::status(FileError::Unknown);
        };
        match packetizer.read_next(flags) {
            Ok(packet) => {
                if packet.is_last() {
                    self.packetizer = None;
                }
                FileReply {
                    error_code: FileError::Success,
                    data: FileReplyData::Packet(packet),
                }
            }
            Err(_) => {
                self.packetizer = None;
                FileReply::status(FileError::FileReadError)
            }
        }
    }

    fn packet(&mut self, packet: &FilePacket) -> FileReply {
        let Some(depacketizer) = self.depacketizer.as_mut() else {
            warn!("unexpected file packet");
            return FileReply::status(FileError::Unknown);
        };
        let reply = match depacketizer.write_next(packet) {
            Ok(()) => FileReply::status(FileError::Success),
            Err(_) => FileReply::status(FileError::FileWriteError),
        };
        if packet.is_last() || !reply.is_success() {
            self.depacketizer = None;
        }
        reply
    }
}

fn drive_list() -> FileReply {
    let mut list = DriveList::default();

    list.items.push(DriveListItem {
        kind: DriveKind::Fixed,
        path: String::from("/"),
        name: String::from("Root"),
        total_space: -1,
        free_space: -1,
    });

    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        let desktop = home.join("Desktop");
        list.items.push(DriveListItem {
            kind: DriveKind::HomeFolder,
            path: home.to_string_lossy().into_owned(),
            name: String::from("Home"),
            total_space: -1,
            free_space: -1,
        });
        if desktop.is_dir() {
            list.items.push(DriveListItem {
                kind: DriveKind::DesktopFolder,
                path: desktop.to_string_lossy().into_owned(),
                name: String::from("Desktop"),
                total_space: -1,
                free_space: -1,
            });
        }
    }

    if list.items.is_empty() {
        return FileReply::status(FileError::NoDrivesFound);
    }
    FileReply {
        error_code: FileError::Success,
        data: FileReplyData::DriveList(list),
    }
}

fn file_list(path: &Path) -> FileReply {
    if !path.exists() {
        return FileReply::status(FileError::PathNotFound);
    }
    if !path.is_dir() {
        return FileReply::status(FileError::InvalidPathName);
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return FileReply::status(FileError::AccessDenied),
    };

    let mut list = FileList::default();
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modification_time = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        list.items.push(FileListItem {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modification_time,
            is_directory: metadata.is_dir(),
        });
    }

    FileReply {
        error_code: FileError::Success,
        data: FileReplyData::FileList(list),
    }
}

fn create_directory(path: &Path) -> FileReply {
    if path.exists() {
        return FileReply::status(FileError::PathAlreadyExists);
    }
    match fs::create_dir(path) {
        Ok(()) => FileReply::status(FileError::Success),
        Err(_) => FileReply::status(FileError::AccessDenied),
    }
}

fn rename(old_path: &Path, new_path: &Path) -> FileReply {
    if old_path == new_path {
        return FileReply::status(FileError::Success);
    }
    if !old_path.exists() {
        return FileReply::status(FileError::PathNotFound);
    }
    if new_path.exists() {
        return FileReply::status(FileError::PathAlreadyExists);
    }
    match fs::rename(old_path, new_path) {
        Ok(()) => FileReply::status(FileError::Success),
        Err(_) => FileReply::status(FileError::AccessDenied),
    }
}

fn remove(path: &Path) -> FileReply {
    if !path.exists() {
        return FileReply::status(FileError::PathNotFound);
    }
    let removed = match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir(path),
        Ok(_) => fs::remove_file(path),
        Err(error) => Err(error),
    };
    match removed {
        Ok(()) => FileReply::status(FileError::Success),
        Err(_) => FileReply::status(FileError::AccessDenied),
    }
}
