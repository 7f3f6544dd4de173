//! File loading for tradelane worlds, content packs and tweak sets in RON,
//! TOML or JSON.

pub mod loader;
pub mod scenario;

pub use loader::{DataLoadError, Format};
pub use scenario::{ScenarioData, load_scenario_dir};
