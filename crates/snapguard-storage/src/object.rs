//! Object storage snapshot store on OpenDAL
//!
//! Layout: `v1/<snap_dir>/<snap_name>` inside the bucket. The store owns a
//! current-thread tokio runtime and blocks on it, so it must not be called
//! from inside another tokio runtime. Fetched objects are pulled in ranged
//! blocks as the caller reads, never loaded whole.

use std::io::{self, Read};
use std::sync::Arc;

use opendal::Operator;
use snapguard_core::{SnapList, Snapshot, BACKUP_FORMAT_VERSION};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{SnapReader, SnapStore};

/// Upload block size for streamed saves
const WRITE_BLOCK_SIZE: usize = 256 * 1024;

/// Range size for streamed fetches
const READ_BLOCK_SIZE: u64 = 256 * 1024;

/// Settings for an S3 (or S3-compatible) bucket
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, SeaweedFS, ...); AWS when `None`
    pub endpoint: Option<String>,
}

pub struct ObjectSnapStore {
    op: Operator,
    runtime: Arc<Runtime>,
    prefix: String,
}

impl ObjectSnapStore {
    pub fn new(op: Operator) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            op,
            runtime: Arc::new(runtime),
            prefix: BACKUP_FORMAT_VERSION.to_string(),
        })
    }

    /// S3 bucket store. Credentials come from the standard AWS environment
    /// variables / profile chain.
    pub fn s3(settings: &S3Settings) -> StoreResult<Self> {
        let mut builder = opendal::services::S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region);
        if let Some(endpoint) = &settings.endpoint {
            if endpoint.starts_with("http://") {
                warn!(
                    endpoint = %endpoint,
                    "S3 endpoint uses plaintext HTTP, snapshot traffic is unencrypted in transit"
                );
            }
            builder = builder.endpoint(endpoint);
        }

        let op = Operator::new(builder)
            .map_err(|e| StoreError::Config(format!("creating S3 operator: {e}")))?
            .layer(opendal::layers::LoggingLayer::default())
            .layer(
                opendal::layers::RetryLayer::new()
                    .with_max_times(5)
                    .with_jitter(),
            )
            .finish();

        debug!(bucket = %settings.bucket, "object snapstore opened");
        Self::new(op)
    }

    /// In-process store backed by OpenDAL's memory service.
    pub fn in_memory() -> StoreResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| StoreError::Config(format!("creating memory operator: {e}")))?
            .finish();
        Self::new(op)
    }

    fn key(&self, snapshot: &Snapshot) -> String {
        format!("{}/{}", self.prefix, snapshot.path())
    }
}

impl SnapStore for ObjectSnapStore {
    fn fetch(&self, snapshot: &Snapshot) -> StoreResult<SnapReader> {
        let key = self.key(snapshot);
        let meta = self.runtime.block_on(async { self.op.stat(&key).await })?;
        Ok(Box::new(ObjectReader {
            op: self.op.clone(),
            runtime: Arc::clone(&self.runtime),
            len: meta.content_length(),
            key,
            offset: 0,
            block: Vec::new(),
            pos: 0,
        }))
    }

    fn save(&self, snapshot: &Snapshot, mut data: SnapReader) -> StoreResult<()> {
        let key = self.key(snapshot);
        let bytes = self.runtime.block_on(async {
            let mut writer = self.op.writer(&key).await?;
            let mut total = 0u64;
            loop {
                let mut block = vec![0u8; WRITE_BLOCK_SIZE];
                let n = match data.read(&mut block) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        if let Err(abort) = writer.abort().await {
                            warn!(key = %key, "aborting upload failed: {abort}");
                        }
                        return Err(StoreError::Io(e));
                    }
                };
                block.truncate(n);
                writer.write(block).await?;
                total += n as u64;
            }
            writer.close().await?;
            Ok::<u64, StoreError>(total)
        })?;
        drop(data);

        debug!(key = %key, bytes, "snapshot uploaded");
        Ok(())
    }

    fn list(&self) -> StoreResult<SnapList> {
        let root = format!("{}/", self.prefix);
        let entries = match self
            .runtime
            .block_on(async { self.op.list_with(&root).recursive(true).await })
        {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(SnapList::default()),
            Err(e) => return Err(e.into()),
        };

        let mut snaps = Vec::new();
        for entry in entries {
            if !entry.metadata().mode().is_file() {
                continue;
            }
            let rel = entry.path().trim_start_matches(&root);
            match Snapshot::parse_path(rel) {
                Ok(snap) => snaps.push(snap),
                Err(e) => warn!("skipping unrecognised object: {e}"),
            }
        }
        Ok(SnapList::new(snaps))
    }

    fn delete(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let key = self.key(snapshot);
        self.runtime.block_on(async {
            if !self.op.exists(&key).await? {
                return Err(StoreError::NotFound(key.clone()));
            }
            self.op.delete(&key).await?;
            Ok(())
        })?;
        debug!(key = %key, "snapshot deleted");
        Ok(())
    }
}

/// Lazily reads one object in `READ_BLOCK_SIZE` ranges through the store's runtime.
struct ObjectReader {
    op: Operator,
    runtime: Arc<Runtime>,
    key: String,
    len: u64,
    offset: u64,
    block: Vec<u8>,
    pos: usize,
}

impl ObjectReader {
    fn next_block(&mut self) -> io::Result<()> {
        let end = (self.offset + READ_BLOCK_SIZE).min(self.len);
        let (op, key) = (&self.op, &self.key);
        let range = self.offset..end;
        let buf = self
            .runtime
            .block_on(async { op.read_with(key).range(range).await })
            .map_err(|e| io::Error::other(format!("reading {key}: {e}")))?;

        let block = buf.to_vec();
        if block.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{key} ended at {} of {} bytes", self.offset, self.len),
            ));
        }
        self.offset += block.len() as u64;
        self.block = block;
        self.pos = 0;
        Ok(())
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.block.len() {
            if self.offset >= self.len {
                return Ok(0);
            }
            self.next_block()?;
        }
        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
