//! Loading pipeline: find data files, deserialize them, build the catalog.
//!
//! A content directory holds a required `content.{ron,toml,json}` and an
//! optional `config.{ron,toml,json}`. Exactly one format per base name.

use crate::schema::*;
use cadence_core::catalog::*;
use cadence_core::game::GameConfig;
use cadence_core::id::*;
use cadence_core::modifier::ModifierDef;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// Errors
// ===========================================================================

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

    /// The content parsed but does not form a valid catalog.
    #[error("invalid content in {file}: {source}")]
    Catalog {
        file: PathBuf,
        #[source]
        source: CatalogError,
    },

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

/// Detect the format of a file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Look for `{base_name}.ron`, `.toml`, or `.json` in `dir`.
///
/// `Ok(None)` when absent, `Err(ConflictingFormats)` when more than one exists.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format).map_err(|detail| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    })
}

/// Deserialize text in a known format. The error is the parser's message.
pub fn deserialize_str<T: DeserializeOwned>(content: &str, format: Format) -> Result<T, String> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
}

// ===========================================================================
// Catalog construction
// ===========================================================================

fn effect_ids(effects: &[EffectRef]) -> Vec<ModifierId> {
    effects
        .iter()
        .map(|e| ModifierId::new(e.modifier_id.as_str()))
        .collect()
}

/// Convert parsed content into a validated catalog.
pub fn build_catalog(data: ContentData) -> Result<Catalog, CatalogError> {
    let mut builder = CatalogBuilder::new();

    for t in data.node_types {
        let cost_resource = t.cost_resource.unwrap_or_else(|| t.output_resource.clone());
        builder.node_type(NodeTypeDef {
            id: NodeTypeId::new(t.id),
            base_cycle_seconds: t.base_cycle_seconds,
            base_output_per_cycle: t.base_output_per_cycle,
            output_resource: ResourceId::new(t.output_resource),
            base_level_cost: t.base_level_cost,
            level_cost_growth: t.level_cost_growth,
            cost_resource: ResourceId::new(cost_resource),
            automation_cost: t.automation_cost,
            tags: t.tags.into_iter().collect(),
        });
    }

    for n in data.nodes {
        builder.instance(NodeInstanceDef {
            id: InstanceId::new(n.id),
            node_type: NodeTypeId::new(n.node_type),
            display_name: n.display_name,
            initial: InitialNodeState {
                enabled: n.initial.enabled,
                level: n.initial.level,
            },
        });
    }

    for m in data.modifiers {
        let def = ModifierDef::parse(
            m.id.as_str(),
            m.source.clone(),
            &m.scope.kind,
            m.scope.reference(),
            &m.operation,
            &m.target,
            m.value,
        );
        if let Err(reason) = &def.rule {
            log::debug!("modifier '{}' loaded as skipped: {reason}", m.id);
        }
        builder.modifier(def);
    }

    for u in data.upgrades {
        builder.upgrade(UpgradeDef {
            id: UpgradeId::new(u.id),
            cost: u
                .cost
                .into_iter()
                .map(|c| CostItem::new(c.resource, c.amount))
                .collect(),
            repeatable: u.repeatable,
            max_rank: u.max_rank,
            cost_growth: u.cost_growth,
            effects: effect_ids(&u.effects),
        });
    }

    for m in data.milestones {
        builder.milestone(MilestoneDef {
            id: MilestoneId::new(m.id),
            grant_effects: effect_ids(&m.grant_effects),
        });
    }

    for b in data.buffs {
        builder.buff(BuffDef {
            id: BuffId::new(b.id),
            duration_seconds: b.duration_seconds,
            stacking: b.stacking,
            effects: effect_ids(&b.effects),
        });
    }

    builder.build()
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything loaded from a content directory.
#[derive(Debug)]
pub struct GameData {
    pub catalog: Arc<Catalog>,
    pub config: GameConfig,
}

/// Load `content.*` into a catalog.
pub fn load_content(dir: &Path) -> Result<Catalog, DataLoadError> {
    let path = require_data_file(dir, "content")?;
    let data: ContentData = deserialize_file(&path)?;
    let catalog = build_catalog(data).map_err(|source| DataLoadError::Catalog {
        file: path.clone(),
        source,
    })?;
    for issue in catalog.content_issues() {
        log::warn!(
            "{}: {:?} '{}' references unknown modifiers {:?}",
            path.display(),
            issue.kind,
            issue.id,
            issue.missing
        );
    }
    Ok(catalog)
}

/// Load `config.*`, or the defaults when absent.
pub fn load_config(dir: &Path) -> Result<GameConfig, DataLoadError> {
    match find_data_file(dir, "config")? {
        Some(path) => deserialize_file(&path),
        None => Ok(GameConfig::default()),
    }
}

/// Load content and config from a directory.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let catalog = load_content(dir)?;
    let config = load_config(dir)?;
    log::info!(
        "loaded {} node instances from {}",
        catalog.instance_count(),
        dir.display()
    );
    Ok(GameData {
        catalog: Arc::new(catalog),
        config,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::clock::ClockMode;
    use cadence_core::modifier::{Scope, SkipReason, Target};
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cadence_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const CONTENT_JSON: &str = r#"{
        "nodeTypes": [
            { "id": "gold_mine", "baseCycleSeconds": 2.0, "baseOutputPerCycle": 10.0,
              "outputResource": "gold", "baseLevelCost": 10.0, "levelCostGrowth": 1.2,
              "automationCost": 100.0, "tags": ["ore"] }
        ],
        "nodes": [
            { "id": "mine_a", "nodeType": "gold_mine", "initial": { "enabled": true, "level": 1 } },
            { "id": "mine_b", "nodeType": "gold_mine", "displayName": "Deep Mine" }
        ],
        "modifiers": [
            { "id": "mod.speed", "source": "upgrade.speed",
              "scope": { "kind": "nodeTag", "nodeTag": "ore" },
              "operation": "multiply", "target": "node.speedMultiplier", "value": 1.5 },
            { "id": "mod.gain", "scope": { "kind": "resource", "resource": "gold" },
              "operation": "multiply", "target": "resourceGain", "value": 2.0 },
            { "id": "mod.weird", "scope": { "kind": "planet" },
              "operation": "multiply", "target": "nodeSpeed", "value": 2.0 }
        ],
        "upgrades": [
            { "id": "upgrade.speed", "cost": [{ "resource": "gold", "amount": 50.0 }],
              "repeatable": true, "maxRank": 5, "costGrowth": 1.5,
              "effects": [{ "modifierId": "mod.speed" }] }
        ],
        "milestones": [
            { "id": "milestone.rich", "grantEffects": [{ "modifierId": "mod.gain" }] }
        ],
        "buffs": [
            { "id": "rush", "durationSeconds": 30.0, "stacking": "extend",
              "effects": [{ "modifierId": "mod.speed" }] }
        ]
    }"#;

    // -----------------------------------------------------------------------
    // detect_format / find_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("content.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("content.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("content.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("content.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("content")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("find_conflict");
        fs::write(dir.join("content.ron"), "()").unwrap();
        fs::write(dir.join("content.json"), "{}").unwrap();

        assert!(matches!(
            find_data_file(&dir, "content"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn missing_content_is_required() {
        let dir = make_test_dir("missing_content");
        assert!(matches!(
            load_content(&dir),
            Err(DataLoadError::MissingRequired { .. })
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    #[test]
    fn json_content_builds_catalog() {
        let data: ContentData = deserialize_str(CONTENT_JSON, Format::Json).unwrap();
        let catalog = build_catalog(data).unwrap();

        assert_eq!(catalog.instance_count(), 2);
        let mine_b = catalog.instance(&InstanceId::from("mine_b")).unwrap();
        assert_eq!(mine_b.display_name.as_deref(), Some("Deep Mine"));
        assert!(!mine_b.initial.enabled);

        let ty = catalog.node_type(&NodeTypeId::from("gold_mine")).unwrap();
        assert_eq!(ty.cost_resource, ResourceId::from("gold"));

        let speed = catalog.modifier(&ModifierId::from("mod.speed")).unwrap();
        let rule = speed.rule.as_ref().unwrap();
        assert_eq!(rule.scope, Scope::NodeTag("ore".into()));
        assert_eq!(rule.target, Target::NodeSpeed);
        assert_eq!(speed.source.as_deref(), Some("upgrade.speed"));

        let weird = catalog.modifier(&ModifierId::from("mod.weird")).unwrap();
        assert_eq!(weird.rule, Err(SkipReason::UnknownScopeKind("planet".into())));

        let up = catalog.upgrade(&UpgradeId::from("upgrade.speed")).unwrap();
        assert_eq!(up.rank_cap(), Some(5));
        assert_eq!(up.cost_at_rank(2)[0].amount, 112.5);

        let rush = catalog.buff(&BuffId::from("rush")).unwrap();
        assert_eq!(rush.stacking, StackingPolicy::Extend);
        assert!(catalog.content_issues().is_empty());
    }

    #[test]
    fn ron_content_with_defaults() {
        let ron = r#"(
            nodeTypes: [
                (id: "farm", baseCycleSeconds: 1.0, baseOutputPerCycle: 2.0, outputResource: "wheat"),
            ],
            nodes: [(id: "farm_1", nodeType: "farm")],
        )"#;
        let data: ContentData = deserialize_str(ron, Format::Ron).unwrap();
        let catalog = build_catalog(data).unwrap();

        let ty = catalog.node_type(&NodeTypeId::from("farm")).unwrap();
        assert_eq!(ty.level_cost_growth, 1.15);
        assert_eq!(ty.cost_resource, ResourceId::from("wheat"));
        assert!(catalog.upgrades().next().is_none());
    }

    #[test]
    fn toml_content() {
        let toml = r#"
[[nodeTypes]]
id = "farm"
baseCycleSeconds = 1.0
baseOutputPerCycle = 2.0
outputResource = "wheat"

[[nodes]]
id = "farm_1"
nodeType = "farm"

[[modifiers]]
id = "mod.fert"
operation = "multiply"
target = "nodeOutput[wheat]"
value = 2.0
scope = { kind = "global" }

[[upgrades]]
id = "upgrade.fert"
effects = [{ modifierId = "mod.fert" }, { modifierId = "mod.missing" }]
"#;
        let data: ContentData = deserialize_str(toml, Format::Toml).unwrap();
        let catalog = build_catalog(data).unwrap();

        assert!(!catalog.is_upgrade_valid(&UpgradeId::from("upgrade.fert")));
        assert_eq!(catalog.content_issues().len(), 1);
    }

    #[test]
    fn unknown_node_type_is_a_catalog_error() {
        let dir = make_test_dir("bad_type");
        fs::write(
            dir.join("content.json"),
            r#"{ "nodes": [{ "id": "a", "nodeType": "missing" }] }"#,
        )
        .unwrap();

        assert!(matches!(
            load_content(&dir),
            Err(DataLoadError::Catalog {
                source: CatalogError::UnknownNodeType { .. },
                ..
            })
        ));

        cleanup(&dir);
    }

    #[test]
    fn parse_error_names_file() {
        let dir = make_test_dir("parse_err");
        fs::write(dir.join("content.ron"), "this is not valid RON {{{").unwrap();

        let err = load_content(&dir).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
        assert!(err.to_string().contains("content.ron"));

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Config
    // -----------------------------------------------------------------------

    #[test]
    fn config_defaults_when_absent() {
        let dir = make_test_dir("config_absent");
        assert_eq!(load_config(&dir).unwrap(), GameConfig::default());
        cleanup(&dir);
    }

    #[test]
    fn partial_toml_config() {
        let dir = make_test_dir("config_toml");
        fs::write(
            dir.join("config.toml"),
            "tick_seconds = 0.5\nclock = \"variable\"\nauto_collect = false\n",
        )
        .unwrap();

        let config = load_config(&dir).unwrap();
        assert_eq!(config.tick_seconds, 0.5);
        assert_eq!(config.clock, ClockMode::Variable);
        assert!(!config.auto_collect);
        assert_eq!(config.max_catch_up_steps, 10_000);

        cleanup(&dir);
    }

    #[test]
    fn load_game_data_from_directory() {
        let dir = make_test_dir("full");
        fs::write(dir.join("content.json"), CONTENT_JSON).unwrap();
        fs::write(dir.join("config.ron"), "(max_offline_seconds: 60.0)").unwrap();

        let data = load_game_data(&dir).unwrap();
        assert_eq!(data.catalog.instance_count(), 2);
        assert_eq!(data.config.max_offline_seconds, 60.0);

        cleanup(&dir);
    }
}
