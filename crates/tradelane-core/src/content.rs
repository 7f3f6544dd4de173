//! Content registry v0: goods, recipes and modules.
//!
//! The registry is loaded from closed-world JSON, normalized into ordinal
//! order and reduced to a canonical text whose SHA-256 is the drift digest.
//! Structural validation accumulates every failure as a stable token so a
//! pack report is byte-identical across runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const CONTENT_REGISTRY_VERSION: i64 = 0;
pub const CONTENT_SCHEMA_ID: &str = "ContentRegistrySchema.v0";

/// Embedded default pack. Byte-stable unless the version is bumped.
pub const DEFAULT_REGISTRY_JSON_V0: &str = r#"{
  "version": 0,
  "goods": [
    { "id": "cap_module" },
    { "id": "food" },
    { "id": "fuel" },
    { "id": "metal" },
    { "id": "metal_plate" },
    { "id": "ore" }
  ],
  "recipes": [
    {
      "id": "recipe_refine_ore_to_food",
      "inputs": [ { "good_id": "ore", "qty": 2 } ],
      "outputs": [ { "good_id": "food", "qty": 1 } ]
    },
    {
      "id": "recipe_refine_ore_to_metal",
      "inputs": [ { "good_id": "ore", "qty": 10 }, { "good_id": "fuel", "qty": 1 } ],
      "outputs": [ { "good_id": "metal", "qty": 5 } ]
    },
    {
      "id": "stage0_smelt_ore_to_plates",
      "inputs": [ { "good_id": "ore", "qty": 10 } ],
      "outputs": [ { "good_id": "metal_plate", "qty": 5 } ]
    },
    {
      "id": "stage1_assemble_cap_module",
      "inputs": [ { "good_id": "metal_plate", "qty": 5 } ],
      "outputs": [ { "good_id": "cap_module", "qty": 1 } ]
    }
  ],
  "modules": [
    { "id": "cap_module_refinery" }
  ]
}
"#;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodDef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipeLine {
    pub good_id: String,
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub id: String,
    pub inputs: Vec<RecipeLine>,
    pub outputs: Vec<RecipeLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentRegistry {
    pub version: i64,
    pub goods: Vec<GoodDef>,
    pub recipes: Vec<RecipeDef>,
    pub modules: Vec<ModuleDef>,
}

impl ContentRegistry {
    /// The embedded default pack, parsed and validated from its JSON text.
    pub fn default_v0() -> Result<Self, ContentError> {
        load_from_json(DEFAULT_REGISTRY_JSON_V0)
    }

    /// The embedded default pack built directly in normalized order.
    /// Must equal [`ContentRegistry::default_v0`]; the kernel uses this so
    /// construction cannot fail.
    pub fn embedded_v0() -> Self {
        fn line(good_id: &str, qty: i64) -> RecipeLine {
            RecipeLine { good_id: good_id.to_string(), qty }
        }
        fn recipe(id: &str, inputs: Vec<RecipeLine>, outputs: Vec<RecipeLine>) -> RecipeDef {
            RecipeDef { id: id.to_string(), inputs, outputs }
        }
        let goods = ["cap_module", "food", "fuel", "metal", "metal_plate", "ore"]
            .into_iter()
            .map(|id| GoodDef { id: id.to_string() })
            .collect();
        Self {
            version: CONTENT_REGISTRY_VERSION,
            goods,
            recipes: vec![
                recipe("recipe_refine_ore_to_food", vec![line("ore", 2)], vec![line("food", 1)]),
                recipe(
                    "recipe_refine_ore_to_metal",
                    vec![line("fuel", 1), line("ore", 10)],
                    vec![line("metal", 5)],
                ),
                recipe("stage0_smelt_ore_to_plates", vec![line("ore", 10)], vec![line("metal_plate", 5)]),
                recipe("stage1_assemble_cap_module", vec![line("metal_plate", 5)], vec![line("cap_module", 1)]),
            ],
            modules: vec![ModuleDef { id: "cap_module_refinery".to_string() }],
        }
    }

    pub fn has_good(&self, id: &str) -> bool {
        self.goods.binary_search_by(|g| g.id.as_str().cmp(id)).is_ok()
    }

    pub fn recipe(&self, id: &str) -> Option<&RecipeDef> {
        self.recipes
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.recipes[i])
    }

    pub fn module(&self, id: &str) -> Option<&ModuleDef> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Sort goods, recipes and modules by id and every recipe's lines by
    /// (good id, qty).
    pub fn normalize(&mut self) {
        self.goods.sort_by(|a, b| a.id.cmp(&b.id));
        self.modules.sort_by(|a, b| a.id.cmp(&b.id));
        self.recipes.sort_by(|a, b| a.id.cmp(&b.id));
        for r in &mut self.recipes {
            r.inputs.sort();
            r.outputs.sort();
        }
    }

    /// Fixed keys in fixed order, LF newlines only.
    pub fn canonical_text(&self) -> String {
        fn lines(v: &[RecipeLine]) -> String {
            v.iter()
                .map(|l| format!("{}:{}", l.good_id, l.qty))
                .collect::<Vec<_>>()
                .join(",")
        }
        let join_ids = |ids: Vec<&str>| ids.join(",");

        let mut out = String::with_capacity(512);
        out.push_str("CONTENT_REGISTRY_V0\n");
        out.push_str(&format!("version={}\n", self.version));
        out.push_str(&format!(
            "goods={}\n",
            join_ids(self.goods.iter().map(|g| g.id.as_str()).collect())
        ));
        out.push_str(&format!(
            "recipes={}\n",
            join_ids(self.recipes.iter().map(|r| r.id.as_str()).collect())
        ));
        for r in &self.recipes {
            out.push_str(&format!(
                "recipe={}|in={}|out={}\n",
                r.id,
                lines(&r.inputs),
                lines(&r.outputs)
            ));
        }
        out.push_str(&format!(
            "modules={}\n",
            join_ids(self.modules.iter().map(|m| m.id.as_str()).collect())
        ));
        out
    }

    /// Uppercase SHA-256 hex of the canonical text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_text().as_bytes());
        hex::encode_upper(hasher.finalize())
    }

    pub fn digest_report(&self) -> String {
        format!(
            "CONTENT_REGISTRY_DIGEST_V0\nversion={}\ngoods_count={}\nrecipes_count={}\nmodules_count={}\ndigest_sha256_upper={}\n",
            self.version,
            self.goods.len(),
            self.recipes.len(),
            self.modules.len(),
            self.digest()
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural content failure. `path` is `root` for the top-level object,
/// otherwise an element path such as `recipes[1].inputs[0]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("content registry JSON is empty")]
    Empty,
    #[error("content registry JSON parse error: {message}")]
    Parse { message: String },
    #[error("content registry root must be an object")]
    RootNotObject,
    #[error("{path}: entry must be an object")]
    NotObject { path: String },
    #[error("{path}: unknown field(s): {keys}")]
    UnknownFields { path: String, keys: String },
    #[error("{path}: missing required field '{field}'")]
    Missing { path: String, field: &'static str },
    #[error("{path}: field '{field}' must be a {expected}")]
    WrongType {
        path: String,
        field: &'static str,
        expected: &'static str,
    },
    #[error("unsupported content registry version {found} (expected {expected})", expected = CONTENT_REGISTRY_VERSION)]
    UnsupportedVersion { found: i64 },
    #[error("{path}: field '{field}' must be non-empty")]
    EmptyValue { path: String, field: &'static str },
    #[error("duplicate {label} id: {id}")]
    DuplicateId { label: &'static str, id: String },
    #[error("{path}: '{field}' must have at least 1 line")]
    NoLines { path: String, field: &'static str },
    #[error("{path}: unknown good_id '{good_id}'")]
    UnknownGood { path: String, good_id: String },
    #[error("{path}: qty must be > 0")]
    NonPositiveQty { path: String },
}

impl ContentError {
    /// Stable failure token for pack reports.
    pub fn token(&self) -> String {
        fn at(path: &str, rest: String) -> String {
            if path == "root" {
                rest
            } else {
                format!("{path}_{rest}")
            }
        }
        match self {
            ContentError::Empty => "JSON_EMPTY".into(),
            ContentError::Parse { .. } => "JSON_PARSE_ERROR".into(),
            ContentError::RootNotObject => "ROOT_NOT_OBJECT".into(),
            ContentError::NotObject { path } => format!("{path}_NOT_OBJECT"),
            ContentError::UnknownFields { path, keys } if path == "root" => {
                format!("ROOT_UNKNOWN_FIELDS:{keys}")
            }
            ContentError::UnknownFields { path, keys } => format!("{path}_UNKNOWN_FIELDS:{keys}"),
            ContentError::Missing { path, field } => at(path, format!("MISSING:{field}")),
            ContentError::WrongType {
                path,
                field,
                expected,
            } => at(path, format!("TYPE:{field}:not_{expected}")),
            ContentError::UnsupportedVersion { .. } => "VALUE:version:expected_0".into(),
            ContentError::EmptyValue { path, field } => at(path, format!("VALUE:{field}:empty")),
            ContentError::DuplicateId { label, id } => format!("{label}[]_DUPLICATE_ID:{id}"),
            ContentError::NoLines { path, field } => at(path, format!("VALUE:{field}:minItems_1")),
            ContentError::UnknownGood { path, good_id } => {
                at(path, format!("VALUE:good_id:unknown:{good_id}"))
            }
            ContentError::NonPositiveQty { path } => at(path, "VALUE:qty:must_be_gt_0".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Strict load. Fails with the first failure in token order.
pub fn load_from_json(json: &str) -> Result<ContentRegistry, ContentError> {
    into_result(validate_pack_json(json))
}

/// Strict load from an already-parsed document (used by the file front end).
pub fn load_from_value(value: &Value) -> Result<ContentRegistry, ContentError> {
    into_result(validate_pack_value(value))
}

fn into_result(v: PackValidation) -> Result<ContentRegistry, ContentError> {
    match (v.registry, v.failures.into_iter().next()) {
        (Some(reg), None) => Ok(reg),
        (_, Some(err)) => Err(err),
        (None, None) => Err(ContentError::RootNotObject),
    }
}

/// Outcome of a full structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PackValidation {
    pub is_valid: bool,
    /// Sorted by token.
    pub failures: Vec<ContentError>,
    /// Normalized registry, present only when valid.
    pub registry: Option<ContentRegistry>,
}

impl PackValidation {
    fn invalid(mut failures: Vec<ContentError>) -> Self {
        failures.sort_by_key(ContentError::token);
        Self {
            is_valid: false,
            failures,
            registry: None,
        }
    }

    pub fn failure_tokens(&self) -> Vec<String> {
        self.failures.iter().map(ContentError::token).collect()
    }

    /// Diff-friendly validation report. No timestamps.
    pub fn report_text(&self, pack_id: &str) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("CONTENT_PACK_VALIDATION_REPORT_V0\n");
        out.push_str(&format!("pack_id={pack_id}\n"));
        out.push_str(&format!("schema_id={CONTENT_SCHEMA_ID}\n"));
        out.push_str(&format!("schema_version={CONTENT_REGISTRY_VERSION}\n"));
        out.push_str(&format!("is_valid={}\n", self.is_valid));
        out.push_str(&format!("failure_count={}\n", self.failures.len()));
        if let Some(reg) = &self.registry {
            out.push_str(&format!("registry_version={}\n", reg.version));
            out.push_str(&format!("goods_count={}\n", reg.goods.len()));
            out.push_str(&format!("recipes_count={}\n", reg.recipes.len()));
            out.push_str(&format!("modules_count={}\n", reg.modules.len()));
            out.push_str(&format!("digest_sha256_upper={}\n", reg.digest()));
        }
        out.push_str("failures=\n");
        for token in self.failure_tokens() {
            out.push_str(&format!("- {token}\n"));
        }
        out
    }
}

/// Validate pack JSON, accumulating every failure. Never panics.
pub fn validate_pack_json(json: &str) -> PackValidation {
    if json.trim().is_empty() {
        return PackValidation::invalid(vec![ContentError::Empty]);
    }
    match serde_json::from_str::<Value>(json) {
        Ok(value) => validate_pack_value(&value),
        Err(err) => PackValidation::invalid(vec![ContentError::Parse {
            message: err.to_string(),
        }]),
    }
}

pub fn validate_pack_value(value: &Value) -> PackValidation {
    let Some(root) = value.as_object() else {
        return PackValidation::invalid(vec![ContentError::RootNotObject]);
    };

    let mut w = Walker::default();
    w.unknown_fields(root, "root", &["version", "goods", "recipes", "modules"]);

    let mut version = CONTENT_REGISTRY_VERSION;
    match root.get("version") {
        None => w.fail(ContentError::Missing {
            path: "root".into(),
            field: "version",
        }),
        Some(v) => match v.as_i64() {
            None => w.fail(ContentError::WrongType {
                path: "root".into(),
                field: "version",
                expected: "number",
            }),
            Some(found) if found != CONTENT_REGISTRY_VERSION => {
                w.fail(ContentError::UnsupportedVersion { found })
            }
            Some(found) => version = found,
        },
    }

    let goods = w.id_array(root, "goods");
    let modules = w.id_array(root, "modules");
    let known: BTreeSet<&str> = goods.iter().map(String::as_str).collect();
    let recipes = w.recipes(root, &known);

    if !w.failures.is_empty() {
        return PackValidation::invalid(w.failures);
    }

    let mut reg = ContentRegistry {
        version,
        goods: goods.into_iter().map(|id| GoodDef { id }).collect(),
        recipes,
        modules: modules.into_iter().map(|id| ModuleDef { id }).collect(),
    };
    reg.normalize();
    PackValidation {
        is_valid: true,
        failures: Vec::new(),
        registry: Some(reg),
    }
}

#[derive(Default)]
struct Walker {
    failures: Vec<ContentError>,
}

impl Walker {
    fn fail(&mut self, err: ContentError) {
        self.failures.push(err);
    }

    fn unknown_fields(&mut self, obj: &Map<String, Value>, path: &str, allowed: &[&str]) {
        // Map keys iterate sorted.
        let unknown: Vec<&str> = obj
            .keys()
            .map(String::as_str)
            .filter(|k| !allowed.contains(k))
            .collect();
        if !unknown.is_empty() {
            self.fail(ContentError::UnknownFields {
                path: path.to_string(),
                keys: unknown.join(","),
            });
        }
    }

    fn array<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &str,
        field: &'static str,
    ) -> Option<&'v Vec<Value>> {
        match obj.get(field) {
            None => {
                self.fail(ContentError::Missing {
                    path: path.to_string(),
                    field,
                });
                None
            }
            Some(v) => {
                let arr = v.as_array();
                if arr.is_none() {
                    self.fail(ContentError::WrongType {
                        path: path.to_string(),
                        field,
                        expected: "array",
                    });
                }
                arr
            }
        }
    }

    fn string<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &str,
        field: &'static str,
    ) -> Option<&'v str> {
        let Some(v) = obj.get(field) else {
            self.fail(ContentError::Missing {
                path: path.to_string(),
                field,
            });
            return None;
        };
        let Some(s) = v.as_str() else {
            self.fail(ContentError::WrongType {
                path: path.to_string(),
                field,
                expected: "string",
            });
            return None;
        };
        if s.trim().is_empty() {
            self.fail(ContentError::EmptyValue {
                path: path.to_string(),
                field,
            });
            return None;
        }
        Some(s)
    }

    /// `goods` or `modules`: objects carrying only a unique `id`.
    fn id_array(&mut self, root: &Map<String, Value>, label: &'static str) -> Vec<String> {
        let mut ids = Vec::new();
        let Some(entries) = self.array(root, "root", label) else {
            return ids;
        };
        let mut seen = BTreeSet::new();
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("{label}[{i}]");
            let Some(obj) = entry.as_object() else {
                self.fail(ContentError::NotObject { path });
                continue;
            };
            self.unknown_fields(obj, &path, &["id"]);
            if let Some(id) = self.string(obj, &path, "id") {
                if !seen.insert(id) {
                    self.fail(ContentError::DuplicateId {
                        label,
                        id: id.to_string(),
                    });
                    continue;
                }
                ids.push(id.to_string());
            }
        }
        ids
    }

    fn recipes(&mut self, root: &Map<String, Value>, known: &BTreeSet<&str>) -> Vec<RecipeDef> {
        let mut out = Vec::new();
        let Some(entries) = self.array(root, "root", "recipes") else {
            return out;
        };
        let mut seen = BTreeSet::new();
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("recipes[{i}]");
            let Some(obj) = entry.as_object() else {
                self.fail(ContentError::NotObject { path });
                continue;
            };
            self.unknown_fields(obj, &path, &["id", "inputs", "outputs"]);
            let id = self.string(obj, &path, "id");
            if let Some(id) = id {
                if !seen.insert(id) {
                    self.fail(ContentError::DuplicateId {
                        label: "recipes",
                        id: id.to_string(),
                    });
                }
            }
            let inputs = self.lines(obj, &path, "inputs", known);
            let outputs = self.lines(obj, &path, "outputs", known);
            if let Some(id) = id {
                out.push(RecipeDef {
                    id: id.to_string(),
                    inputs,
                    outputs,
                });
            }
        }
        out
    }

    fn lines(
        &mut self,
        recipe: &Map<String, Value>,
        path: &str,
        field: &'static str,
        known: &BTreeSet<&str>,
    ) -> Vec<RecipeLine> {
        let mut out = Vec::new();
        let Some(entries) = self.array(recipe, path, field) else {
            return out;
        };
        if entries.is_empty() {
            self.fail(ContentError::NoLines {
                path: path.to_string(),
                field,
            });
        }
        for (j, entry) in entries.iter().enumerate() {
            let lp = format!("{path}.{field}[{j}]");
            let Some(obj) = entry.as_object() else {
                self.fail(ContentError::NotObject { path: lp });
                continue;
            };
            self.unknown_fields(obj, &lp, &["good_id", "qty"]);
            let good = self.string(obj, &lp, "good_id");
            if let Some(g) = good {
                if !known.contains(g) {
                    self.fail(ContentError::UnknownGood {
                        path: lp.clone(),
                        good_id: g.to_string(),
                    });
                }
            }
            let qty = match obj.get("qty") {
                None => {
                    self.fail(ContentError::Missing {
                        path: lp.clone(),
                        field: "qty",
                    });
                    None
                }
                Some(v) => match v.as_i64() {
                    None => {
                        self.fail(ContentError::WrongType {
                            path: lp.clone(),
                            field: "qty",
                            expected: "number",
                        });
                        None
                    }
                    Some(q) if q <= 0 => {
                        self.fail(ContentError::NonPositiveQty { path: lp.clone() });
                        None
                    }
                    Some(q) => Some(q),
                },
            };
            if let (Some(g), Some(q)) = (good, qty) {
                out.push(RecipeLine {
                    good_id: g.to_string(),
                    qty: q,
                });
            }
        }
        out
    }
}
