use std::sync::Arc;

use crate::config::Config;
use crate::mediatool::MediaTool;
use crate::observability::Metrics;
use crate::tasks::TaskStore;
use crate::worker::TaskQueue;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<TaskStore>,
    pub queue: TaskQueue,
    pub tool: Arc<dyn MediaTool>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<TaskStore>,
        queue: TaskQueue,
        tool: Arc<dyn MediaTool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            queue,
            tool,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
