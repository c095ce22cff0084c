use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::app_state::AppState;
use crate::models::job::CompletedBuild;
use crate::services::scheduler::OrderHandler;

/// Claims a dispatched order and runs the build pipeline on it.
pub struct BuildWorker {
    state: AppState,
}

impl BuildWorker {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn log_build_metrics(&self, build: &CompletedBuild, runtime: Duration) {
        let id = build.order.id();
        let metadata = build.order.attributes();
        let archive = self.state.store.archive_path(id);
        let file_size_mb = match tokio::fs::metadata(&archive).await {
            Ok(meta) if build.summary.is_successful() => meta.len() as f64 / (1024.0 * 1024.0),
            _ => 0.0,
        };

        tracing::info!(
            map_id = %id,
            success = build.summary.is_successful(),
            message = %build.summary.message,
            style = %metadata.style,
            format = %metadata.fileformat,
            scale = metadata.scale,
            width_mm = metadata.print_width,
            height_mm = metadata.print_height,
            file_size_mb = %format!("{file_size_mb:.1}"),
            runtime_secs = %format!("{:.1}", runtime.as_secs_f64()),
            "Build metrics"
        );
    }
}

impl OrderHandler for BuildWorker {
    async fn handle(&self, order: String, workspace: TempDir) {
        let claimed = match self.state.queue.claim(&order, workspace.path()).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(order = %order, error = %e, "Cannot claim order, skipped");
                return;
            }
        };

        let started = Instant::now();
        let result = self.state.pipeline.run(workspace.path(), &claimed).await;
        let runtime = started.elapsed();

        match &result {
            Ok(build) => {
                let outcome = if build.summary.is_successful() { "successful" } else { "failed" };
                metrics::counter!("map_builds_total", "outcome" => outcome).increment(1);
                metrics::histogram!("map_build_duration_seconds").record(runtime.as_secs_f64());
                tracing::info!(
                    map_id = %build.order.id(),
                    successful = build.summary.is_successful(),
                    message = %build.summary.message,
                    "Map build finished"
                );
                if self.state.config.build_metrics {
                    self.log_build_metrics(build, runtime).await;
                }
            }
            Err(e) => {
                metrics::counter!("map_builds_total", "outcome" => "abandoned").increment(1);
                tracing::error!(order = %order, error = %e, "Map build abandoned");
            }
        }

        if self.state.config.test_mode {
            let kept = workspace.keep();
            tracing::info!(path = %kept.display(), "Workspace kept (test mode)");
        } else if let Err(e) = workspace.close() {
            tracing::warn!(order = %order, error = %e, "Cannot remove workspace");
        }
    }
}
