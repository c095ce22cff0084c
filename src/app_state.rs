use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{pipeline::BuildPipeline, queue::OrderQueue, store::RecordStore};

/// Shared service state handed to every build task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<RecordStore>,
    pub queue: Arc<OrderQueue>,
    pub pipeline: Arc<BuildPipeline>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(RecordStore::new(&config));
        let queue = Arc::new(OrderQueue::new(&config));
        let pipeline = Arc::new(BuildPipeline::new(Arc::clone(&config), Arc::clone(&store)));
        Self {
            config,
            store,
            queue,
            pipeline,
        }
    }
}
