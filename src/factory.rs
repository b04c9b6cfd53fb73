//! Wiring: backend client, writer lifecycle, and the spanstore surfaces

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::backend::RestClient;
use crate::config::Options;
use crate::store::{Reader, StoreError, Writer};

/// Builds the backend client and owns the writer's lifecycle. The embedding
/// service asks it for the span writer and reader surfaces.
pub struct Factory {
    options: Options,
    client: Arc<RestClient>,
    writer: Option<Arc<Writer>>,
    compactor: Option<JoinHandle<()>>,
}

impl Factory {
    pub fn new(options: Options) -> Self {
        let client = Arc::new(RestClient::new(&options.backend_url, options.http_timeout()));
        Self {
            options,
            client,
            writer: None,
            compactor: None,
        }
    }

    /// Ensure backend tables and start the writer's compaction worker.
    pub async fn initialize(&mut self) -> Result<(), StoreError> {
        let writer = Arc::new(Writer::new(
            Arc::clone(&self.client),
            self.options.clone(),
        ));
        let handle = Arc::clone(&writer).start().await?;
        tracing::info!("span store initialized against {}", self.options.backend_url);
        self.writer = Some(writer);
        self.compactor = Some(handle);
        Ok(())
    }

    /// Write surface; available after `initialize`.
    pub fn span_writer(&self) -> Result<Arc<Writer>, StoreError> {
        self.writer.clone().ok_or(StoreError::NotStarted)
    }

    /// Read surface; usable independently of the writer.
    pub fn span_reader(&self) -> Reader {
        Reader::new(Arc::clone(&self.client))
    }

    /// Stop the compaction worker. Buffered rows in the current bucket stay
    /// in memory; the design accepts losing the not-yet-compacted bucket on
    /// shutdown.
    pub fn shutdown(&mut self) {
        if let Some(writer) = &self.writer {
            writer.stop();
        }
        if let Some(handle) = self.compactor.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_unavailable_before_initialize() {
        let factory = Factory::new(Options::default());
        assert!(matches!(
            factory.span_writer(),
            Err(StoreError::NotStarted)
        ));
    }

    #[test]
    fn test_reader_available_without_initialize() {
        let factory = Factory::new(Options::default());
        let _reader = factory.span_reader();
    }

    #[test]
    fn test_shutdown_without_initialize_is_noop() {
        let mut factory = Factory::new(Options::default());
        factory.shutdown();
    }
}
