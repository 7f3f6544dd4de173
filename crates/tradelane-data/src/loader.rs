//! File front end: format detection (RON/TOML/JSON), file discovery, and
//! typed loaders that hand parsed documents to the core validators.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use tradelane_core::content::{self, ContentError, ContentRegistry};
use tradelane_core::tweaks::{TWEAK_CONFIG_VERSION, TweakConfig};
use tradelane_core::world_loader::{WorldDefinition, WorldLoadError};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading data files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("unsupported tweak config version {found} in {file} (expected {expected})", expected = TWEAK_CONFIG_VERSION)]
    TweaksVersion { file: PathBuf, found: u32 },

    #[error(transparent)]
    World(#[from] WorldLoadError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    /// Discovery order. The first match wins unless a second also exists.
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }

    /// Format named by the path's extension.
    pub fn of(path: &Path) -> Result<Format, DataLoadError> {
        let ext = path.extension().and_then(|e| e.to_str());
        Self::ALL
            .into_iter()
            .find(|f| Some(f.extension()) == ext)
            .ok_or_else(|| DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            })
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// The one `{base_name}.{ron,toml,json}` in `dir`, if any. Two or more is
/// `ConflictingFormats`, since either could be the intended source.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut present = Format::ALL
        .into_iter()
        .map(|f| dir.join(format!("{base_name}.{}", f.extension())))
        .filter(|p| p.is_file());
    match (present.next(), present.next()) {
        (Some(a), Some(b)) => Err(DataLoadError::ConflictingFormats { a, b }),
        (first, _) => Ok(first),
    }
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `text` in the given format. `origin` only labels errors.
pub fn deserialize_str<T: DeserializeOwned>(
    text: &str,
    format: Format,
    origin: &Path,
) -> Result<T, DataLoadError> {
    let parse_err = |detail: String| DataLoadError::Parse {
        file: origin.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(text).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(text).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(text).map_err(|e| parse_err(e.to_string())),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = Format::of(path)?;
    let text = std::fs::read_to_string(path)?;
    deserialize_str(&text, format, path)
}

// ===========================================================================
// Typed loaders
// ===========================================================================

/// Load a world definition. Structural checks happen later, when the
/// definition is applied to a state.
pub fn load_world_file(path: &Path) -> Result<WorldDefinition, DataLoadError> {
    let def: WorldDefinition = deserialize_file(path)?;
    tracing::debug!(
        target: "tradelane::data",
        file = %path.display(),
        world = %def.world_id,
        nodes = def.nodes.len(),
        edges = def.edges.len(),
        "data.world_parsed"
    );
    Ok(def)
}

/// Load a content registry. Any format is first read into a JSON document
/// so the closed-world validator sees the same shape regardless of source.
pub fn load_content_file(path: &Path) -> Result<ContentRegistry, DataLoadError> {
    let doc: serde_json::Value = deserialize_file(path)?;
    let registry = content::load_from_value(&doc)?;
    tracing::debug!(
        target: "tradelane::data",
        file = %path.display(),
        digest = %registry.digest(),
        "data.content_parsed"
    );
    Ok(registry)
}

/// Load tweaks strictly: a parse failure or unknown version is an error
/// rather than a silent fallback to defaults.
pub fn load_tweaks_file(path: &Path) -> Result<TweakConfig, DataLoadError> {
    let cfg: TweakConfig = deserialize_file(path)?;
    if cfg.version != TWEAK_CONFIG_VERSION {
        return Err(DataLoadError::TweaksVersion {
            file: path.to_path_buf(),
            found: cfg.version,
        });
    }
    Ok(cfg.sanitized())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tradelane_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // Format::of
    // -----------------------------------------------------------------------

    #[test]
    fn format_from_extension() {
        for f in Format::ALL {
            let name = format!("tweaks.{}", f.extension());
            assert_eq!(Format::of(Path::new(&name)).unwrap(), f);
        }
    }

    #[test]
    fn format_unsupported() {
        for name in ["world.yaml", "world", "world.JSON"] {
            assert!(matches!(
                Format::of(Path::new(name)),
                Err(DataLoadError::UnsupportedFormat { .. })
            ));
        }
    }

    // -----------------------------------------------------------------------
    // find_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn find_data_file_found_and_missing() {
        let dir = make_test_dir("find");
        assert_eq!(find_data_file(&dir, "world").unwrap(), None);
        fs::write(dir.join("world.toml"), "").unwrap();
        assert_eq!(find_data_file(&dir, "world").unwrap(), Some(dir.join("world.toml")));
        cleanup(&dir);
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("world.ron"), "()").unwrap();
        fs::write(dir.join("world.json"), "{}").unwrap();
        assert!(matches!(
            find_data_file(&dir, "world"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn require_data_file_missing() {
        let dir = make_test_dir("require");
        let err = require_data_file(&dir, "world").unwrap_err();
        assert!(err.to_string().starts_with("required file 'world' not found"));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Typed loaders
    // -----------------------------------------------------------------------

    const WORLD_RON: &str = r#"(
        worldId: "ron_world",
        markets: [(id: "mkt_a", inventory: {"ore": 5})],
        nodes: [(id: "stn_a", kind: "station", pos: [0.0, 0.0, 0.0], marketId: "mkt_a")],
        player: Some((credits: 250, locationNodeId: "stn_a")),
    )"#;

    const WORLD_TOML: &str = r#"
worldId = "toml_world"

[[markets]]
id = "mkt_a"
inventory = { ore = 5 }

[[nodes]]
id = "stn_a"
kind = "Station"
pos = [0.0, 0.0, 0.0]
marketId = "mkt_a"

[[nodes]]
id = "stn_b"
kind = "Waypoint"
pos = [1.5, 0.0, 0.0]

[[edges]]
id = "lane_ab"
fromNodeId = "stn_a"
toNodeId = "stn_b"
distance = 1.5
totalCapacity = 3

[player]
credits = 250
locationNodeId = "stn_a"
"#;

    #[test]
    fn world_from_ron() {
        let dir = make_test_dir("world_ron");
        let path = dir.join("world.ron");
        fs::write(&path, WORLD_RON).unwrap();
        let def = load_world_file(&path).unwrap();
        assert_eq!(def.world_id, "ron_world");
        assert_eq!(def.markets[0].inventory["ore"], 5);
        assert_eq!(def.player.map(|p| p.credits), Some(250));
        cleanup(&dir);
    }

    #[test]
    fn world_from_toml() {
        let dir = make_test_dir("world_toml");
        let path = dir.join("world.toml");
        fs::write(&path, WORLD_TOML).unwrap();
        let def = load_world_file(&path).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges[0].total_capacity, 3);
        cleanup(&dir);
    }

    #[test]
    fn world_unknown_field_is_parse_error() {
        let err = deserialize_str::<WorldDefinition>(
            r#"{"worldId":"w","bogus":1}"#,
            Format::Json,
            Path::new("inline.json"),
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
    }

    #[test]
    fn content_from_toml_matches_json_digest() {
        let toml_text = r#"
version = 0
modules = []

[[goods]]
id = "ore"

[[goods]]
id = "metal"

[[recipes]]
id = "smelt"
inputs = [{ good_id = "ore", qty = 2 }]
outputs = [{ good_id = "metal", qty = 1 }]
"#;
        let json_text = r#"{"version":0,"modules":[],"goods":[{"id":"metal"},{"id":"ore"}],
            "recipes":[{"id":"smelt","inputs":[{"good_id":"ore","qty":2}],
            "outputs":[{"good_id":"metal","qty":1}]}]}"#;
        let dir = make_test_dir("content");
        let path = dir.join("content.toml");
        fs::write(&path, toml_text).unwrap();
        let from_toml = load_content_file(&path).unwrap();
        let from_json = content::load_from_json(json_text).unwrap();
        assert_eq!(from_toml.digest(), from_json.digest());
        cleanup(&dir);
    }

    #[test]
    fn content_validation_error_passes_through() {
        let dir = make_test_dir("content_bad");
        let path = dir.join("content.json");
        fs::write(&path, r#"{"version":1,"goods":[],"recipes":[],"modules":[]}"#).unwrap();
        assert!(matches!(
            load_content_file(&path),
            Err(DataLoadError::Content(ContentError::UnsupportedVersion { found: 1 }))
        ));
        cleanup(&dir);
    }

    #[test]
    fn tweaks_from_ron_with_defaults() {
        let dir = make_test_dir("tweaks");
        let path = dir.join("tweaks.ron");
        fs::write(&path, "(version: 0, market_fee_multiplier: 1.5, risk_scalar: -2.0)").unwrap();
        let cfg = load_tweaks_file(&path).unwrap();
        assert_eq!(cfg.market_fee_multiplier, 1.5);
        assert_eq!(cfg.risk_scalar, 1.0);
        assert_eq!(cfg.worldgen_min_producers_per_good, 1);
        cleanup(&dir);
    }

    #[test]
    fn tweaks_wrong_version_rejected() {
        let dir = make_test_dir("tweaks_version");
        let path = dir.join("tweaks.toml");
        fs::write(&path, "version = 3\n").unwrap();
        assert!(matches!(
            load_tweaks_file(&path),
            Err(DataLoadError::TweaksVersion { found: 3, .. })
        ));
        cleanup(&dir);
    }
}
