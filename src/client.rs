use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::{Catalog, ChildList};
use crate::codec::{Codec, JsonCodec};
use crate::config::UploadConfig;
use crate::error::Result;
use crate::session::{Item, UploadTarget};
use crate::transport::{path_segment, Resource, Transport, TransportRequest, TransportResponse};
use crate::upload::UploadOrchestrator;
use crate::UploadSource;

/// Entry point for talking to a drive: uploads, child lookups and downloads
/// over one [`Transport`].
#[derive(Debug, Clone)]
pub struct DriveClient<T, C = JsonCodec> {
    transport: T,
    codec: C,
    config: UploadConfig,
}

impl<T: Transport> DriveClient<T> {
    pub fn new(transport: T) -> Self {
        DriveClient {
            transport,
            codec: JsonCodec,
            config: UploadConfig::default(),
        }
    }
}

impl<T: Transport, C: Codec> DriveClient<T, C> {
    pub fn with_codec<D: Codec>(self, codec: D) -> DriveClient<T, D> {
        DriveClient {
            transport: self.transport,
            codec,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// An orchestrator that reconciles through this client's own child
    /// listing.
    pub fn orchestrator(&self) -> UploadOrchestrator<'_, T, C, Self> {
        UploadOrchestrator::new(&self.transport, &self.codec, self, &self.config)
    }

    /// Uploads all of `source` to `target`, see [`UploadOrchestrator::upload`].
    pub async fn upload_file<B>(&self, target: &UploadTarget, source: &mut B, cancel: CancellationToken) -> Result<Item>
    where
        B: UploadSource + Unpin + Send,
    {
        self.orchestrator().with_cancellation(cancel).upload(target, source).await
    }

    /// The child of `parent_id` named `name`, compared case-insensitively.
    pub async fn child_item(&self, drive_id: &str, parent_id: &str, name: &str) -> Result<Option<Item>> {
        let request = TransportRequest::get(format!(
            "drives/{}/items/{}/children",
            path_segment(drive_id),
            path_segment(parent_id)
        ));
        let response = self.transport.send(request).await?;
        let children: ChildList = self.codec.decode(&response.body)?;
        debug!(count = children.value.len(), "listed children");
        Ok(children.find(name))
    }

    /// Fetches the content of `item_id`, from byte `from` onwards when given.
    pub async fn download(&self, drive_id: &str, item_id: &str, from: Option<u64>) -> Result<TransportResponse> {
        let mut request = TransportRequest::get(self.download_url(drive_id, item_id));
        if let Some(offset) = from {
            request = self.transport.resume_from(request, offset)?;
        }
        self.transport.send(request).await
    }

    pub fn download_url(&self, drive_id: &str, item_id: &str) -> Resource {
        Resource::Path(format!("drives/{}/items/{}/content", path_segment(drive_id), path_segment(item_id)))
    }
}

#[async_trait]
impl<T: Transport, C: Codec> Catalog for DriveClient<T, C> {
    async fn find_child(&self, drive_id: &str, parent_id: &str, name: &str) -> Result<Option<Item>> {
        self.child_item(drive_id, parent_id, name).await
    }
}
