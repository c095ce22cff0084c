use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::job::{BuildSummary, ClaimedOrder, CompletedBuild};
use crate::models::mapstate::{BoxMillimeter, Mapstate};
use crate::models::metadata::{MapData, Metadata};
use crate::models::report::RendererReport;
use crate::services::overlay::{write_style_document, OverlayDocument};
use crate::services::packaging::{map_file, publish, Packager, PackagingError};
use crate::services::renderer::{ParsedReport, RenderRequest, RendererDriver, RendererError};
use crate::services::store::{RecordStore, StoreError, FILE_ARCHIVE};

/// Runs one claimed order from order document to published archive.
pub struct BuildPipeline {
    config: Arc<AppConfig>,
    store: Arc<RecordStore>,
    renderer: RendererDriver,
    packager: Packager,
}

impl BuildPipeline {
    pub fn new(config: Arc<AppConfig>, store: Arc<RecordStore>) -> Self {
        Self {
            renderer: RendererDriver::new(&config),
            packager: Packager::new(&config),
            config,
            store,
        }
    }

    /// Build the map described by `order` inside `workspace`.
    ///
    /// Step failures end up in the map state and yield a failed summary.
    /// An error is returned only when the order or the state document cannot
    /// be handled at all; the build is abandoned in that case.
    pub async fn run(&self, workspace: &Path, order: &ClaimedOrder) -> Result<CompletedBuild, PipelineError> {
        let data = read_order(&order.path).await?;
        let id = data.id();

        let mut state = self.store.read_mapstate_or_default(id).await?;
        state.data.attributes.record_build_started(Utc::now());
        self.store.write_mapstate(&state).await?;
        tracing::info!(map_id = %id, order = %order.name, "Map build started");

        let summary = match self.execute(workspace, id, data.attributes()).await {
            Ok(report) => {
                record_boxes(&mut state.data.attributes, data.attributes(), &report);
                BuildSummary::successful()
            }
            Err(e) => {
                tracing::warn!(map_id = %id, error = %e, "Map build failed");
                BuildSummary::failed(e.user_message())
            }
        };

        state
            .data
            .attributes
            .record_build_completed(Utc::now(), summary.outcome, summary.message.as_str());
        self.store.write_mapstate(&state).await?;

        Ok(CompletedBuild { order: data, summary })
    }

    async fn execute(&self, workspace: &Path, id: Uuid, metadata: &Metadata) -> Result<RendererReport, BuildStepError> {
        let style = self
            .config
            .find_style(&metadata.style)
            .ok_or_else(|| BuildStepError::StyleNotFound(metadata.style.clone()))?;
        let format = metadata
            .output_format()
            .ok_or_else(|| BuildStepError::UnknownFormat(metadata.fileformat.clone()))?;

        let base_style = style.xml();
        let output = map_file(workspace, format);
        let request = RenderRequest::new(metadata, format, &base_style, &output);

        let parsed = self.renderer.info(&request).await?;
        match &parsed {
            ParsedReport::Invalid { error, .. } => {
                tracing::warn!(map_id = %id, error = %error, "Renderer info output incomplete");
            }
            ParsedReport::WithoutLayers(_) => {
                tracing::debug!(map_id = %id, "Renderer reported no layer list");
            }
            ParsedReport::Complete(_) => {}
        }
        let report = parsed.into_report();

        let mut overlay = OverlayDocument::for_map(metadata, report.projected);
        overlay.rewrite_file_references(&self.store.map_dir(id), &self.config.markers_dir);
        let style_document = write_style_document(style, id, &overlay)
            .await
            .map_err(BuildStepError::StyleDocument)?;

        let rendered = self.renderer.build(&request.with_style(&style_document)).await;
        if !self.config.test_mode {
            if let Err(e) = tokio::fs::remove_file(&style_document).await {
                tracing::warn!(path = %style_document.display(), error = %e, "Cannot remove style document");
            }
        }
        rendered?;

        if format.needs_document_properties() {
            self.packager
                .add_pdf_properties(workspace, metadata)
                .await
                .map_err(BuildStepError::Properties)?;
        }

        let archive = self
            .packager
            .archive(workspace, &output, FILE_ARCHIVE)
            .await
            .map_err(BuildStepError::Archive)?;
        publish(&archive, &self.store.archive_path(id))
            .await
            .map_err(BuildStepError::Publish)?;

        Ok(report)
    }
}

async fn read_order(path: &Path) -> Result<MapData, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| PipelineError::Order {
        path: path.display().to_string(),
        reason: source.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|source| PipelineError::Order {
        path: path.display().to_string(),
        reason: source.to_string(),
    })
}

fn record_boxes(state: &mut Mapstate, metadata: &Metadata, report: &RendererReport) {
    state.map_build_box_millimeter = BoxMillimeter {
        width: metadata.print_width,
        height: metadata.print_height,
    };
    state.map_build_box_pixel = report.pixels;
    state.map_build_box_projection = report.projected;
    state.map_build_box_wgs84 = report.wgs84;
}

/// A pipeline step that failed. Recorded in the map state, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum BuildStepError {
    #[error("Style {0} not configured")]
    StyleNotFound(String),

    #[error("Unsupported file format {0}")]
    UnknownFormat(String),

    #[error("Cannot write style document: {0}")]
    StyleDocument(std::io::Error),

    #[error("Renderer: {0}")]
    Renderer(#[from] RendererError),

    #[error("Document properties: {0}")]
    Properties(PackagingError),

    #[error("Archive: {0}")]
    Archive(PackagingError),

    #[error("Publish: {0}")]
    Publish(PackagingError),
}

impl BuildStepError {
    /// Message stored in `MapBuildMessage`.
    pub fn user_message(&self) -> String {
        match self {
            BuildStepError::StyleNotFound(_) => "map style not found".to_string(),
            BuildStepError::UnknownFormat(_) => "unsupported file format".to_string(),
            BuildStepError::StyleDocument(_) => "error creating map style".to_string(),
            BuildStepError::Renderer(e) => e.user_message(),
            BuildStepError::Properties(_) => "error modifying pdf meta data".to_string(),
            BuildStepError::Archive(_) => "error zipping map file".to_string(),
            BuildStepError::Publish(_) => "error moving zipped map to download location".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Cannot read order {path}: {reason}")]
    Order { path: String, reason: String },

    #[error("Map state error: {0}")]
    State(#[from] StoreError),
}
