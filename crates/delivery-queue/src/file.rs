//! Crash-safe file of length-prefixed, checksummed entries.
//!
//! Layout (little-endian):
//!
//! ```text
//! header  [magic "DPQ1"][version u32][count u64][head u64][crc32 u32][reserved u32]
//! entry   [len u32][crc32 u32][payload; len]
//! ```
//!
//! The header is the commit point. An append writes and syncs the entry
//! first and only then publishes it by rewriting the header, so a crash in
//! between leaves bytes past the last committed entry that [`QueueFile::open`]
//! truncates. A remove is a single header rewrite that moves `head` forward.
//!
//! The header is written in place. It is smaller than one disk sector, so a
//! torn write is not expected; if one happens its CRC no longer matches and
//! `open` reports [`QueueError::Corrupt`] instead of guessing.

use crate::{QueueError, QueueResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Size of the file header; the first entry starts here.
pub const HEADER_LEN: u64 = 32;

/// Dead prefix size after which the live entries are rewritten to a new file.
pub const COMPACTION_THRESHOLD_BYTES: u64 = 1024 * 1024;

const MAGIC: &[u8; 4] = b"DPQ1";
const FORMAT_VERSION: u32 = 1;
const FRAME_HEADER_LEN: u64 = 8;
const COPY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    count: u64,
    head: u64,
}

impl Header {
    fn empty() -> Self {
        Self {
            count: 0,
            head: HEADER_LEN,
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.head.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..24]);
        buf[24..28].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN as usize]) -> QueueResult<Self> {
        if &buf[0..4] != MAGIC {
            return Err(QueueError::Corrupt("bad magic".to_string()));
        }
        let version = read_u32(&buf[4..8]);
        if version != FORMAT_VERSION {
            return Err(QueueError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }
        let stored_crc = read_u32(&buf[24..28]);
        if crc32fast::hash(&buf[0..24]) != stored_crc {
            return Err(QueueError::Corrupt("header checksum mismatch".to_string()));
        }
        Ok(Self {
            count: read_u64(&buf[8..16]),
            head: read_u64(&buf[16..24]),
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

/// FIFO of opaque byte entries persisted in a single file.
#[derive(Debug)]
pub struct QueueFile {
    path: PathBuf,
    file: File,
    count: u64,
    /// Offset of the first live entry.
    head: u64,
    /// End of the last committed entry.
    tail: u64,
    #[cfg(test)]
    fail_header_sync: bool,
}

impl QueueFile {
    /// Open the queue at `path`, creating it (and parent directories) if needed.
    ///
    /// Every committed entry is checksum-verified; bytes after the last
    /// committed entry are discarded.
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        if file_len < HEADER_LEN {
            if file_len > 0 {
                warn!(
                    path = %path.display(),
                    file_len,
                    "Queue file shorter than its header, reinitializing"
                );
            }
            let mut queue = Self {
                path,
                file,
                count: 0,
                head: HEADER_LEN,
                tail: HEADER_LEN,
                #[cfg(test)]
                fail_header_sync: false,
            };
            queue.reset()?;
            return Ok(queue);
        }

        let mut raw = [0u8; HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut raw)?;
        let header = Header::decode(&raw)?;

        if header.head < HEADER_LEN || header.head > file_len {
            return Err(QueueError::Corrupt(format!(
                "head offset {} outside file of {} bytes",
                header.head, file_len
            )));
        }

        let mut queue = Self {
            path,
            file,
            count: header.count,
            head: header.head,
            tail: file_len,
            #[cfg(test)]
            fail_header_sync: false,
        };

        let mut pos = header.head;
        for index in 0..header.count {
            let (_, next) = queue.read_frame(pos).map_err(|e| match e {
                QueueError::Corrupt(reason) => {
                    QueueError::Corrupt(format!("entry {}: {}", index, reason))
                }
                other => other,
            })?;
            pos = next;
        }
        queue.tail = pos;

        if header.count == 0 && (header.head != HEADER_LEN || file_len > HEADER_LEN) {
            debug!(path = %queue.path.display(), "Normalizing empty queue file");
            queue.reset()?;
        } else if file_len > queue.tail {
            warn!(
                path = %queue.path.display(),
                discarded_bytes = file_len - queue.tail,
                "Truncating uncommitted bytes after last entry"
            );
            queue.file.set_len(queue.tail)?;
            queue.file.sync_all()?;
        }

        info!(
            path = %queue.path.display(),
            count = queue.count,
            "Queue file opened"
        );
        Ok(queue)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed entries.
    pub fn size(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current on-disk length in bytes.
    pub fn file_len(&self) -> QueueResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Append an entry. Durable once this returns `Ok`.
    pub fn append(&mut self, data: &[u8]) -> QueueResult<()> {
        let len = u32::try_from(data.len()).map_err(|_| {
            QueueError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry of {} bytes exceeds the frame limit", data.len()),
            ))
        })?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN as usize + data.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        frame.extend_from_slice(data);

        let committed = Header {
            count: self.count + 1,
            head: self.head,
        };
        if let Err(e) = self.write_at(self.tail, &frame) {
            // Nothing references the partial frame yet.
            let _ = self.file.set_len(self.tail);
            return Err(e.into());
        }

        // The header may have reached the disk even though the write failed,
        // so the frame has to stay. If it did not, open() drops the frame as
        // uncommitted; otherwise the next append overwrites it.
        self.write_header(committed)?;

        self.count = committed.count;
        self.tail += frame.len() as u64;
        Ok(())
    }

    /// Read the head entry without removing it.
    pub fn peek(&mut self) -> QueueResult<Vec<u8>> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }
        let (payload, _) = self.read_frame(self.head)?;
        Ok(payload)
    }

    /// Remove the head entry.
    pub fn remove(&mut self) -> QueueResult<()> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }

        if self.count == 1 {
            self.write_header(Header::empty())?;
            self.count = 0;
            self.head = HEADER_LEN;
            self.tail = HEADER_LEN;
            if let Err(e) = self.truncate_to_header() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to shrink emptied queue file"
                );
            }
            return Ok(());
        }

        let next = self.frame_end(self.head)?;
        let committed = Header {
            count: self.count - 1,
            head: next,
        };
        self.write_header(committed)?;
        self.count = committed.count;
        self.head = committed.head;

        if self.should_compact() {
            if let Err(e) = self.compact() {
                warn!(path = %self.path.display(), error = %e, "Queue compaction failed");
            }
        }
        Ok(())
    }

    /// Remove every entry. Idempotent.
    pub fn clear(&mut self) -> QueueResult<()> {
        self.reset()?;
        debug!(path = %self.path.display(), "Queue file cleared");
        Ok(())
    }

    fn reset(&mut self) -> QueueResult<()> {
        self.write_header(Header::empty())?;
        self.count = 0;
        self.head = HEADER_LEN;
        self.tail = HEADER_LEN;
        self.truncate_to_header()?;
        Ok(())
    }

    fn truncate_to_header(&mut self) -> io::Result<()> {
        self.file.set_len(HEADER_LEN)?;
        self.file.sync_all()
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    fn write_header(&mut self, header: Header) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_header_sync {
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&header.encode())?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"));
        }
        self.write_at(0, &header.encode())
    }

    fn read_frame_header(&mut self, pos: u64) -> QueueResult<(u32, u32)> {
        if pos + FRAME_HEADER_LEN > self.tail {
            return Err(QueueError::Corrupt(format!(
                "frame header at {} runs past end of data ({})",
                pos, self.tail
            )));
        }
        let mut raw = [0u8; FRAME_HEADER_LEN as usize];
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(&mut raw)?;
        Ok((read_u32(&raw[0..4]), read_u32(&raw[4..8])))
    }

    fn frame_end(&mut self, pos: u64) -> QueueResult<u64> {
        let (len, _) = self.read_frame_header(pos)?;
        let end = pos + FRAME_HEADER_LEN + len as u64;
        if end > self.tail {
            return Err(QueueError::Corrupt(format!(
                "frame at {} of {} bytes runs past end of data ({})",
                pos, len, self.tail
            )));
        }
        Ok(end)
    }

    /// Read and verify the frame at `pos`, returning its payload and the
    /// offset of the next frame.
    fn read_frame(&mut self, pos: u64) -> QueueResult<(Vec<u8>, u64)> {
        let end = self.frame_end(pos)?;
        let (len, crc) = self.read_frame_header(pos)?;
        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != crc {
            return Err(QueueError::Corrupt(format!("checksum mismatch at {}", pos)));
        }
        Ok((payload, end))
    }

    fn should_compact(&self) -> bool {
        let dead = self.head - HEADER_LEN;
        let live = self.tail - self.head;
        dead > COMPACTION_THRESHOLD_BYTES && dead > live
    }

    /// Rewrite the live entries into a fresh file and atomically swap it in.
    fn compact(&mut self) -> QueueResult<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("queue");
        let tmp_path = dir.join(format!(".{}.compact.tmp", file_name));

        let live = self.tail - self.head;
        let header = Header {
            count: self.count,
            head: HEADER_LEN,
        };

        let result = (|| -> QueueResult<File> {
            let mut tmp = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&header.encode())?;

            self.file.seek(SeekFrom::Start(self.head))?;
            let mut remaining = live;
            let mut buf = vec![0u8; COPY_CHUNK];
            while remaining > 0 {
                let chunk = remaining.min(COPY_CHUNK as u64) as usize;
                self.file.read_exact(&mut buf[..chunk])?;
                tmp.write_all(&buf[..chunk])?;
                remaining -= chunk as u64;
            }
            tmp.sync_all()?;

            fs::rename(&tmp_path, &self.path)?;
            if let Ok(parent_dir) = File::open(&dir) {
                let _ = parent_dir.sync_all();
            }
            Ok(tmp)
        })();

        match result {
            Ok(file) => {
                let reclaimed = self.head - HEADER_LEN;
                self.file = file;
                self.head = HEADER_LEN;
                self.tail = HEADER_LEN + live;
                info!(
                    path = %self.path.display(),
                    reclaimed_bytes = reclaimed,
                    count = self.count,
                    "Queue file compacted"
                );
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn frame_len(payload_len: usize) -> u64 {
        FRAME_HEADER_LEN + payload_len as u64
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("delivery.queue");

        let queue = QueueFile::open(&path).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.file_len().unwrap(), HEADER_LEN);
        assert!(path.exists());
    }

    #[test]
    fn test_fifo_order() {
        let dir = tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q")).unwrap();

        queue.append(b"first").unwrap();
        queue.append(b"second").unwrap();
        queue.append(b"third").unwrap();
        assert_eq!(queue.size(), 3);

        assert_eq!(queue.peek().unwrap(), b"first");
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"second");
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"third");
        queue.remove().unwrap();

        assert!(matches!(queue.peek(), Err(QueueError::Empty)));
        assert!(matches!(queue.remove(), Err(QueueError::Empty)));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let dir = tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q")).unwrap();
        queue.append(b"only").unwrap();

        assert_eq!(queue.peek().unwrap(), b"only");
        assert_eq!(queue.peek().unwrap(), b"only");
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"a").unwrap();
            queue.append(b"b").unwrap();
            queue.append(b"c").unwrap();
            queue.remove().unwrap();
        }

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.peek().unwrap(), b"b");
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"c");
    }

    #[test]
    fn test_empty_entry() {
        let dir = tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q")).unwrap();
        queue.append(b"").unwrap();
        queue.append(b"after").unwrap();

        assert_eq!(queue.peek().unwrap(), b"");
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"after");
    }

    #[test]
    fn test_uncommitted_frame_is_discarded_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"committed").unwrap();
        }
        let committed_len = fs::metadata(&path).unwrap().len();

        // A complete frame whose header update never happened.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            let payload = b"lost in crash";
            file.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            file.write_all(&crc32fast::hash(payload).to_le_bytes()).unwrap();
            file.write_all(payload).unwrap();
        }

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.file_len().unwrap(), committed_len);
        assert_eq!(queue.peek().unwrap(), b"committed");

        queue.append(b"next").unwrap();
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"next");
    }

    #[test]
    fn test_failed_header_sync_keeps_written_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"first").unwrap();

            queue.fail_header_sync = true;
            assert!(queue.append(b"second").is_err());
            assert_eq!(queue.size(), 1);
        }

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.peek().unwrap(), b"first");
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"second");
    }

    #[test]
    fn test_append_after_failed_header_sync_overwrites_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"first").unwrap();

            queue.fail_header_sync = true;
            assert!(queue.append(b"lost").is_err());
            queue.fail_header_sync = false;

            queue.append(b"third").unwrap();
            assert_eq!(queue.size(), 2);
        }

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(
            queue.file_len().unwrap(),
            HEADER_LEN + frame_len(5) + frame_len(5)
        );
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"third");
    }

    #[test]
    fn test_torn_tail_is_discarded_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"one").unwrap();
            queue.append(b"two").unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xAB, 0xCD, 0x01]).unwrap();
        }

        let queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(
            queue.file_len().unwrap(),
            HEADER_LEN + frame_len(3) + frame_len(3)
        );
    }

    #[test]
    fn test_corrupted_entry_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"payload-one").unwrap();
        }
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_LEN + FRAME_HEADER_LEN + 2))
                .unwrap();
            file.write_all(b"X").unwrap();
        }

        assert!(matches!(
            QueueFile::open(&path),
            Err(QueueError::Corrupt(_))
        ));
    }

    #[test]
    fn test_corrupted_header_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        {
            let mut queue = QueueFile::open(&path).unwrap();
            queue.append(b"payload").unwrap();
        }
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(8)).unwrap();
            file.write_all(&[9]).unwrap();
        }

        assert!(matches!(
            QueueFile::open(&path),
            Err(QueueError::Corrupt(_))
        ));
    }

    #[test]
    fn test_foreign_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");
        fs::write(&path, [b'Z'; 64]).unwrap();

        assert!(matches!(
            QueueFile::open(&path),
            Err(QueueError::Corrupt(_))
        ));
    }

    #[test]
    fn test_short_file_is_reinitialized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");
        fs::write(&path, b"DPQ").unwrap();

        let queue = QueueFile::open(&path).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.file_len().unwrap(), HEADER_LEN);
    }

    #[test]
    fn test_removing_last_entry_shrinks_file() {
        let dir = tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q")).unwrap();

        queue.append(&[1u8; 512]).unwrap();
        queue.append(&[2u8; 512]).unwrap();
        queue.remove().unwrap();
        assert_eq!(
            queue.file_len().unwrap(),
            HEADER_LEN + 2 * frame_len(512)
        );

        queue.remove().unwrap();
        assert_eq!(queue.file_len().unwrap(), HEADER_LEN);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");

        let mut queue = QueueFile::open(&path).unwrap();
        queue.append(b"a").unwrap();
        queue.append(b"b").unwrap();

        queue.clear().unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.file_len().unwrap(), HEADER_LEN);
        drop(queue);

        let mut queue = QueueFile::open(&path).unwrap();
        assert!(queue.is_empty());
        queue.append(b"fresh").unwrap();
        assert_eq!(queue.peek().unwrap(), b"fresh");
    }

    #[test]
    fn test_compaction_reclaims_dead_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");
        let entry_len = 64 * 1024;
        let total = 20u8;

        let mut queue = QueueFile::open(&path).unwrap();
        for i in 0..total {
            queue.append(&vec![i; entry_len]).unwrap();
        }
        let full_len = queue.file_len().unwrap();
        assert_eq!(full_len, HEADER_LEN + total as u64 * frame_len(entry_len));

        for _ in 0..17 {
            queue.remove().unwrap();
        }

        assert_eq!(queue.size(), 3);
        assert!(queue.file_len().unwrap() <= HEADER_LEN + 4 * frame_len(entry_len));
        assert_eq!(queue.peek().unwrap(), vec![17u8; entry_len]);
        assert!(!dir.path().join(".q.compact.tmp").exists());
        drop(queue);

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 3);
        for i in 17..total {
            assert_eq!(queue.peek().unwrap(), vec![i; entry_len]);
            queue.remove().unwrap();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_append_after_compaction_uses_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q");
        let entry_len = 128 * 1024;

        let mut queue = QueueFile::open(&path).unwrap();
        for i in 0..12u8 {
            queue.append(&vec![i; entry_len]).unwrap();
        }
        for _ in 0..10 {
            queue.remove().unwrap();
        }
        queue.append(b"tail").unwrap();
        drop(queue);

        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.size(), 3);
        queue.remove().unwrap();
        queue.remove().unwrap();
        assert_eq!(queue.peek().unwrap(), b"tail");
    }
}
