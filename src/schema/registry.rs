use super::snapshot::SchemaSnapshot;
use super::table::TableMeta;
use crate::config::ResolutionMode;
use async_trait::async_trait;
use basemodel_core::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Source of table metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn tables(&self) -> Result<Vec<TableMeta>>;
}

/// Provider over a fixed table list.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata(pub Vec<TableMeta>);

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn tables(&self) -> Result<Vec<TableMeta>> {
        Ok(self.0.clone())
    }
}

/// Holds the current [`SchemaSnapshot`].
///
/// Readers clone the `Arc` and keep using it for the whole operation.
/// [`refresh`](Self::refresh) builds the next version and swaps it in;
/// subscribers are notified of every swap.
pub struct SchemaRegistry {
    provider: Arc<dyn MetadataProvider>,
    mode: ResolutionMode,
    current: watch::Sender<Arc<SchemaSnapshot>>,
    refreshing: Mutex<()>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("mode", &self.mode)
            .field("version", &self.current.borrow().version())
            .finish()
    }
}

impl SchemaRegistry {
    /// Loads version 1 from `provider`.
    pub async fn load(provider: Arc<dyn MetadataProvider>, mode: ResolutionMode) -> Result<Self> {
        let snapshot = SchemaSnapshot::build(1, provider.tables().await?, mode)?;
        let (current, _) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            provider,
            mode,
            current,
            refreshing: Mutex::new(()),
        })
    }

    pub async fn from_tables(tables: Vec<TableMeta>, mode: ResolutionMode) -> Result<Self> {
        Self::load(Arc::new(StaticMetadata(tables)), mode).await
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        self.current.borrow().clone()
    }

    /// Re-reads the metadata and publishes the next snapshot version. A
    /// failed build leaves the current snapshot in place.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>> {
        let _guard = self.refreshing.lock().await;
        let version = self.current.borrow().version() + 1;
        let snapshot = Arc::new(SchemaSnapshot::build(
            version,
            self.provider.tables().await?,
            self.mode,
        )?);
        self.current.send_replace(snapshot.clone());
        tracing::info!(
            version,
            diagnostics = snapshot.diagnostics().len(),
            "basemodel.schema.refresh"
        );
        Ok(snapshot)
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SchemaSnapshot>> {
        self.current.subscribe()
    }
}
