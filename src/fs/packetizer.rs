use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::proto::{FilePacket, PACKET_FLAG_FIRST, PACKET_FLAG_LAST, PACKET_REQUEST_CANCEL};
use crate::MAX_FILE_PACKET_SIZE;

/// Splits a file into sequential packets for the wire.
pub struct FilePacketizer {
    file: File,
    file_size: u64,
    left: u64,
    first: bool,
}

impl FilePacketizer {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            file_size,
            left: file_size,
            first: true,
        })
    }

    /// Reads the next packet. A cancel request closes the file early and
    /// yields an immediate final packet.
    pub fn read_next(&mut self, request_flags: u32) -> io::Result<FilePacket> {
        let mut flags = 0;
        if self.first {
            flags |= PACKET_FLAG_FIRST;
            self.first = false;
        }

        if request_flags & PACKET_REQUEST_CANCEL != 0 {
            self.left = 0;
            return Ok(FilePacket {
                flags: flags | PACKET_FLAG_LAST,
                file_size: self.file_size,
                data: Vec::new(),
            });
        }

        let chunk = self.left.min(MAX_FILE_PACKET_SIZE as u64) as usize;
        let mut data = vec![0u8; chunk];
        self.file.read_exact(&mut data)?;
        self.left -= chunk as u64;

        if self.left == 0 {
            flags |= PACKET_FLAG_LAST;
        }
        Ok(FilePacket {
            flags,
            file_size: if flags & PACKET_FLAG_FIRST != 0 {
                self.file_size
            } else {
                0
            },
            data,
        })
    }
}

/// Reassembles a packet stream into a file on disk.
pub struct FileDepacketizer {
    file: File,
    expected: Option<u64>,
    written: u64,
}

impl FileDepacketizer {
    pub fn create(path: &Path, overwrite: bool) -> io::Result<Self> {
        let file = if overwrite {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?
        } else {
            OpenOptions::new().write(true).create_new(true).open(path)?
        };
        Ok(Self {
            file,
            expected: None,
            written: 0,
        })
    }

    pub fn write_next(&mut self, packet: &FilePacket) -> io::Result<()> {
        if packet.is_first() {
            self.expected = Some(packet.file_size);
        }
        self.file.write_all(&packet.data)?;
        self.written += packet.data.len() as u64;
        if packet.is_last() {
            self.file.flush()?;
        }
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Declared size from the first packet, when seen.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::PACKET_REQUEST_NO_FLAGS;
    use std::fs;

    fn write_fixture(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        fs::write(&path, content).expect("fixture");
        path
    }

    #[test]
    fn chunks_cover_the_file_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let len = 2 * MAX_FILE_PACKET_SIZE + 5;
        let path = write_fixture(&dir, "big.bin", len);

        let mut packetizer = FilePacketizer::open(&path).expect("open");
        let first = packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
        assert!(first.is_first());
        assert!(!first.is_last());
        assert_eq!(first.file_size, len as u64);
        assert_eq!(first.data.len(), MAX_FILE_PACKET_SIZE);

        let second = packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
        assert!(!second.is_first());
        assert!(!second.is_last());
        assert_eq!(second.data.len(), MAX_FILE_PACKET_SIZE);

        let third = packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
        assert!(third.is_last());
        assert_eq!(third.data.len(), 5);
    }

    #[test]
    fn empty_file_is_a_single_final_packet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "empty.bin", 0);

        let mut packetizer = FilePacketizer::open(&path).expect("open");
        let packet = packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
        assert!(packet.is_first());
        assert!(packet.is_last());
        assert!(packet.data.is_empty());
        assert_eq!(packet.file_size, 0);
    }

    #[test]
    fn cancel_produces_immediate_final_packet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "canceled.bin", 3 * MAX_FILE_PACKET_SIZE);

        let mut packetizer = FilePacketizer::open(&path).expect("open");
        packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
        let cancel = packetizer.read_next(PACKET_REQUEST_CANCEL).expect("read");
        assert!(cancel.is_last());
        assert!(cancel.data.is_empty());
    }

    #[test]
    fn round_trip_restores_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = write_fixture(&dir, "source.bin", MAX_FILE_PACKET_SIZE + 123);
        let target = dir.path().join("target.bin");

        let mut packetizer = FilePacketizer::open(&source).expect("open");
        let mut depacketizer = FileDepacketizer::create(&target, false).expect("create");
        loop {
            let packet = packetizer.read_next(PACKET_REQUEST_NO_FLAGS).expect("read");
            let last = packet.is_last();
            depacketizer.write_next(&packet).expect("write");
            if last {
                break;
            }
        }
        assert_eq!(
            depacketizer.expected(),
            Some((MAX_FILE_PACKET_SIZE + 123) as u64)
        );
        assert_eq!(
            fs::read(&source).expect("read source"),
            fs::read(&target).expect("read target")
        );
    }

    #[test]
    fn create_without_overwrite_refuses_existing_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "exists.bin", 4);
        assert!(FileDepacketizer::create(&path, false).is_err());
        assert!(FileDepacketizer::create(&path, true).is_ok());
    }
}
