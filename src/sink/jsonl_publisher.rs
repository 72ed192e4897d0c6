use super::backend::{OutboundMessage, PublishError, PublisherBackend};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends each message payload as one line to `<dir>/<topic>.jsonl`, rotating
/// the file once it grows past `max_size_mb`.
pub struct JsonlPublisher {
    file: BufWriter<File>,
    current_size: u64,
    max_size: u64,
    base_path: PathBuf,
    rotation_count: u32,
    max_rotations: u32,
}

impl JsonlPublisher {
    pub fn for_topic(
        dir: impl AsRef<Path>,
        topic: &str,
        max_size_mb: u64,
        max_rotations: u32,
    ) -> Result<Self, PublishError> {
        let path = dir.as_ref().join(format!("{}.jsonl", topic));
        Self::new(path, max_size_mb, max_rotations)
    }

    pub fn new(path: impl AsRef<Path>, max_size_mb: u64, max_rotations: u32) -> Result<Self, PublishError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            file: BufWriter::new(file),
            current_size,
            max_size: max_size_mb.saturating_mul(1024 * 1024),
            base_path: path.to_path_buf(),
            rotation_count: 0,
            max_rotations,
        })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Append one line. Either the whole line reaches the file or the file is
    /// cut back to the end of the previous line.
    fn write_line(&mut self, payload: &[u8]) -> Result<(), PublishError> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');

        if let Err(e) = self.file.write_all(&line).and_then(|_| self.file.flush()) {
            if let Err(undo) = self.discard_partial() {
                log::error!(
                    "❌ Could not cut {} back to its last complete line: {}",
                    self.base_path.display(),
                    undo
                );
            }
            return Err(e.into());
        }
        self.current_size += line.len() as u64;

        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        Ok(())
    }

    /// Drop unwritten buffered bytes and truncate to the last committed line
    fn discard_partial(&mut self) -> Result<(), PublishError> {
        let file = OpenOptions::new().append(true).open(&self.base_path)?;
        let on_disk = file.metadata()?.len();
        file.set_len(on_disk.min(self.current_size))?;

        let stale = std::mem::replace(&mut self.file, BufWriter::new(file));
        let _ = stale.into_parts();
        Ok(())
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        self.base_path.with_extension(format!("jsonl.{}", index))
    }

    fn rotate(&mut self) -> Result<(), PublishError> {
        self.file.flush()?;

        if self.max_rotations == 0 {
            // no history kept, start over in place
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.base_path)?;
            self.file = BufWriter::new(file);
            self.current_size = 0;
            self.rotation_count += 1;
            return Ok(());
        }

        let oldest = self.rotated_path(self.max_rotations);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        for i in (1..self.max_rotations).rev() {
            let old_path = self.rotated_path(i);
            if old_path.exists() {
                std::fs::rename(&old_path, self.rotated_path(i + 1))?;
            }
        }

        if self.base_path.exists() {
            std::fs::rename(&self.base_path, self.rotated_path(1))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base_path)?;

        self.file = BufWriter::new(file);
        self.current_size = 0;
        self.rotation_count += 1;

        log::info!(
            "📄 Rotated {} (rotation #{})",
            self.base_path.display(),
            self.rotation_count
        );

        Ok(())
    }
}

#[async_trait]
impl PublisherBackend for JsonlPublisher {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        self.write_line(&message.payload)
    }

    async fn flush(&mut self) -> Result<(), PublishError> {
        self.file.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_message(payload: &str) -> OutboundMessage {
        OutboundMessage {
            topic: "mptcp-packets".to_string(),
            key: "a:1->b:2".to_string(),
            timestamp: 0,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_writes_one_line_per_message() {
        let dir = TempDir::new().unwrap();
        let mut publisher = JsonlPublisher::for_topic(dir.path(), "mptcp-packets", 100, 3).unwrap();

        publisher.publish(&create_test_message(r#"{"n":1}"#)).await.unwrap();
        publisher.publish(&create_test_message(r#"{"n":2}"#)).await.unwrap();
        publisher.flush().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("mptcp-packets.jsonl")).unwrap();
        assert_eq!(content, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[tokio::test]
    async fn test_rotates_when_full() {
        let dir = TempDir::new().unwrap();
        let mut publisher = JsonlPublisher::for_topic(dir.path(), "t", 0, 2).unwrap();

        // max size 0: every write rotates
        publisher.publish(&create_test_message("first")).await.unwrap();
        publisher.publish(&create_test_message("second")).await.unwrap();
        publisher.publish(&create_test_message("third")).await.unwrap();

        let newest = std::fs::read_to_string(dir.path().join("t.jsonl.1")).unwrap();
        let older = std::fs::read_to_string(dir.path().join("t.jsonl.2")).unwrap();
        assert_eq!(newest, "third\n");
        assert_eq!(older, "second\n");
        assert!(!dir.path().join("t.jsonl.3").exists());
    }

    #[tokio::test]
    async fn test_partial_write_is_cut_before_retry() {
        let dir = TempDir::new().unwrap();
        let mut publisher = JsonlPublisher::for_topic(dir.path(), "t", 100, 2).unwrap();

        publisher.publish(&create_test_message("first")).await.unwrap();

        // half a line reached the file before the write failed
        publisher.file.write_all(b"{\"trunc").unwrap();
        publisher.file.flush().unwrap();
        publisher.discard_partial().unwrap();

        publisher.publish(&create_test_message("second")).await.unwrap();
        publisher.flush().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("t.jsonl")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
