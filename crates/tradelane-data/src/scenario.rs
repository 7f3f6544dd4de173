//! Scenario directories.
//!
//! A scenario directory holds `world.{ron,toml,json}` and optionally
//! `content.*` and `tweaks.*`. [`load_scenario_dir`] parses all three;
//! [`ScenarioData::build_kernel`] installs them into a fresh kernel.

use std::path::Path;

use tradelane_core::content::ContentRegistry;
use tradelane_core::kernel::Kernel;
use tradelane_core::tweaks::TweakConfig;
use tradelane_core::world_loader::WorldDefinition;

use crate::loader::{
    DataLoadError, find_data_file, load_content_file, load_tweaks_file, load_world_file,
    require_data_file,
};

pub const WORLD_FILE: &str = "world";
pub const CONTENT_FILE: &str = "content";
pub const TWEAKS_FILE: &str = "tweaks";

/// Everything a scenario directory provides.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioData {
    pub world: WorldDefinition,
    /// `None` keeps the kernel's embedded default registry.
    pub content: Option<ContentRegistry>,
    /// `None` keeps default tweaks.
    pub tweaks: Option<TweakConfig>,
}

/// Load a scenario directory. Every file present is fully parsed and
/// validated before anything is returned.
pub fn load_scenario_dir(dir: &Path) -> Result<ScenarioData, DataLoadError> {
    let world = load_world_file(&require_data_file(dir, WORLD_FILE)?)?;
    let content = find_data_file(dir, CONTENT_FILE)?
        .map(|p| load_content_file(&p))
        .transpose()?;
    let tweaks = find_data_file(dir, TWEAKS_FILE)?
        .map(|p| load_tweaks_file(&p))
        .transpose()?;
    tracing::info!(
        target: "tradelane::data",
        dir = %dir.display(),
        world = %world.world_id,
        custom_content = content.is_some(),
        custom_tweaks = tweaks.is_some(),
        "data.scenario_loaded"
    );
    Ok(ScenarioData {
        world,
        content,
        tweaks,
    })
}

impl ScenarioData {
    /// A kernel seeded with `seed` holding this scenario's world. Tweaks go
    /// in first so the world load sees them.
    pub fn build_kernel(&self, seed: u64) -> Result<Kernel, DataLoadError> {
        let mut kernel = Kernel::new(seed);
        if let Some(tweaks) = &self.tweaks {
            kernel.set_tweaks(tweaks.clone());
        }
        if let Some(content) = &self.content {
            kernel.set_content(content.clone());
        }
        kernel.load_world(&self.world)?;
        Ok(kernel)
    }
}
