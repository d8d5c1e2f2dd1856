mod graph;
mod progress;
mod walker;

use std::sync::Arc;

use crate::animation::AnimationClip;

pub use graph::{Camera, NodeId, SceneGraph, SceneNode, Transform};
pub use progress::{ImportProgress, ImportStatistics, ProgressCallback};

/// Result of a scene import. Everything hangs below `root`.
#[derive(Debug)]
pub struct ImportedScene {
    pub graph: SceneGraph,
    pub root: NodeId,
    pub animations: Vec<Arc<AnimationClip>>,
    pub statistics: ImportStatistics,
    pub progress: ImportProgress,
}

impl ImportedScene {
    pub fn root_node(&self) -> &SceneNode {
        &self.graph[self.root]
    }

    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.graph.find_by_name(name).map(|id| &self.graph[id])
    }
}
