use serde::{Deserialize, Serialize};

use crate::copy_plan::CopyPlan;
use crate::error::{PipelineError, Result};

pub const DEFAULT_WORKER_COUNT: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Side of a map tile in pixels.
pub const DEFAULT_TILE_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLayout {
    /// Palette indices in plain row-major order.
    Linear,
    /// Frame cut into square tiles, each tile packed after the previous one.
    Tiled { tile_size: usize },
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout::Tiled {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl OutputLayout {
    pub fn copy_plan(&self, width: usize, height: usize) -> Result<CopyPlan> {
        match *self {
            OutputLayout::Linear => CopyPlan::identity(width, height),
            OutputLayout::Tiled { tile_size } => CopyPlan::tiled(width, height, tile_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub layout: OutputLayout,
    /// Prefix for the dispatcher and worker thread names.
    pub thread_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            layout: OutputLayout::default(),
            thread_name: "palette-pipe".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if let OutputLayout::Tiled { tile_size: 0 } = self.layout {
            return Err(PipelineError::InvalidConfig(
                "tile_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn linear(mut self) -> Self {
        self.config.layout = OutputLayout::Linear;
        self
    }

    pub fn tiled(mut self, tile_size: usize) -> Self {
        self.config.layout = OutputLayout::Tiled { tile_size };
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
