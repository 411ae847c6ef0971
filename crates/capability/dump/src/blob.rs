//! Blob 存储抽象。

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 可写 blob；未调用 [`BlobWriter::commit`] 即被丢弃时内容作废。
pub trait BlobWriter: Write + Send {
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// 按名称创建 blob。
pub trait BlobSink: Send + Sync {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>>;
}

fn check_name(name: &str) -> io::Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid blob name: {name}"),
        ));
    }
    Ok(())
}

/// 目录 blob：先写 `<name>.partial`，提交时原子改名。
#[derive(Debug, Clone)]
pub struct FsBlobSink {
    root: PathBuf,
}

impl FsBlobSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobSink for FsBlobSink {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        check_name(name)?;
        fs::create_dir_all(&self.root)?;
        let target = self.root.join(name);
        let partial = self.root.join(format!("{name}.partial"));
        let file = File::create(&partial)?;
        Ok(Box::new(FsBlobWriter {
            file: BufWriter::new(file),
            partial,
            target,
            committed: false,
        }))
    }
}

struct FsBlobWriter {
    file: BufWriter<File>,
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl Write for FsBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FsBlobWriter {
    fn commit(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        fs::rename(&self.partial, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for FsBlobWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// 内存 blob（测试用）。
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobSink {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交 blob 的内容。
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl BlobSink for MemoryBlobSink {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        check_name(name)?;
        Ok(Box::new(MemoryBlobWriter {
            name: name.to_string(),
            buf: Vec::new(),
            blobs: self.blobs.clone(),
        }))
    }
}

struct MemoryBlobWriter {
    name: String,
    buf: Vec<u8>,
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryBlobWriter {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        let mut blobs = this
            .blobs
            .lock()
            .map_err(|_| io::Error::other("blob lock poisoned"))?;
        blobs.insert(this.name, this.buf);
        Ok(())
    }
}
