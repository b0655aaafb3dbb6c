//! Name-keyed buffer lookup.
//!
//! The pipeline builder owns one catalog and hands stages the buffers they
//! ask for by name. The catalog is plain data — it takes no part in the
//! handshake.

use crate::buffer::FrameBuffer;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A name-keyed collection of buffer handles.
#[derive(Default)]
pub struct BufferCatalog {
    buffers: HashMap<String, FrameBuffer>,
}

impl BufferCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer under its own name.
    pub fn insert(&mut self, buffer: FrameBuffer) -> Result<()> {
        let name = buffer.name().to_string();
        if self.buffers.contains_key(&name) {
            return Err(Error::DuplicateBuffer(name));
        }
        self.buffers.insert(name, buffer);
        Ok(())
    }

    /// Look up a buffer by name.
    pub fn get(&self, name: &str) -> Option<&FrameBuffer> {
        self.buffers.get(name)
    }

    /// Names of all registered buffers.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Number of buffers in the catalog.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if the catalog holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Send the shutdown signal to every buffer in the catalog.
    pub fn shutdown_all(&self) {
        for buffer in self.buffers.values() {
            buffer.send_shutdown_signal();
        }
    }
}

impl std::fmt::Debug for BufferCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCatalog")
            .field("buffers", &self.buffers.keys().collect::<Vec<_>>())
            .finish()
    }
}
