use std::sync::Arc;

use serde::Serialize;

/// Running totals over everything built during an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStatistics {
    pub triangles: usize,
    pub vertices: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    pub nodes_total: usize,
    pub nodes_done: usize,
    pub textures_total: usize,
    pub textures_done: usize,
    pub buffers_total: usize,
    pub buffers_done: usize,
}

impl ImportProgress {
    pub fn fraction(&self) -> f32 {
        let total = self.nodes_total + self.textures_total + self.buffers_total;
        if total == 0 {
            return 1.0;
        }
        let done = self.nodes_done.min(self.nodes_total)
            + self.textures_done.min(self.textures_total)
            + self.buffers_done.min(self.buffers_total);
        done as f32 / total as f32
    }
}

pub type ProgressCallback = Arc<dyn Fn(&ImportProgress, &ImportStatistics) + Send + Sync>;
