//! Fault-injecting final stores for merge failure tests.
//!
//! Note: allow(dead_code) because each test file compiles common/ separately.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use stitch_storage::error::{StorageError, StorageResult};
use stitch_storage::traits::{FileSink, FinalFile, FinalStore};
use tokio::sync::Notify;

/// Final store whose sinks fail with an I/O error after a fixed number of
/// writes.
pub struct FlakyFinalStore {
    inner: Arc<dyn FinalStore>,
    writes_before_failure: usize,
}

impl FlakyFinalStore {
    pub fn new(inner: Arc<dyn FinalStore>, writes_before_failure: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            writes_before_failure,
        })
    }
}

#[async_trait]
impl FinalStore for FlakyFinalStore {
    async fn exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.exists(name).await
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn FileSink>> {
        let inner = self.inner.create_sink(name).await?;
        Ok(Box::new(FlakySink {
            inner,
            remaining: self.writes_before_failure,
        }))
    }

    async fn list(&self) -> StorageResult<Vec<FinalFile>> {
        self.inner.list().await
    }
}

struct FlakySink {
    inner: Box<dyn FileSink>,
    remaining: usize,
}

#[async_trait]
impl FileSink for FlakySink {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if self.remaining == 0 {
            return Err(StorageError::Io(std::io::Error::other(
                "injected write failure",
            )));
        }
        self.remaining -= 1;
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<PathBuf> {
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}

/// Final store whose sinks park on a gate before their first write, letting
/// tests hold a merge in flight.
pub struct GatedFinalStore {
    inner: Arc<dyn FinalStore>,
    /// Notified once a sink reaches its first write.
    pub entered: Arc<Notify>,
    /// Released by the test to let the parked sink proceed.
    pub gate: Arc<Notify>,
}

impl GatedFinalStore {
    pub fn new(inner: Arc<dyn FinalStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        })
    }
}

#[async_trait]
impl FinalStore for GatedFinalStore {
    async fn exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.exists(name).await
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn FileSink>> {
        let inner = self.inner.create_sink(name).await?;
        Ok(Box::new(GatedSink {
            inner,
            entered: self.entered.clone(),
            gate: self.gate.clone(),
            parked: false,
        }))
    }

    async fn list(&self) -> StorageResult<Vec<FinalFile>> {
        self.inner.list().await
    }
}

struct GatedSink {
    inner: Box<dyn FileSink>,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    parked: bool,
}

#[async_trait]
impl FileSink for GatedSink {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if !self.parked {
            self.parked = true;
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<PathBuf> {
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}
