//! Engine configuration.
//!
//! Declares which block types create named objects, the family each one
//! belongs to, and the bounds the engine works within.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::program::{IdentitySlot, NodeKind};

/// Default identity field name on creator blocks.
fn default_identity_field() -> String {
    "ID_VAR".to_string()
}

/// Candidate names tried before a mint or rename gives up.
fn default_max_mint_attempts() -> u32 {
    10_000
}

/// Diagnostics kept before the oldest are dropped.
fn default_max_diagnostics() -> usize {
    32
}

fn default_families() -> Vec<FamilyConfig> {
    let mesh = |prefix: &str, node_type: &str| FamilyConfig {
        prefix: prefix.to_string(),
        identity_field: default_identity_field(),
        node_types: vec![node_type.to_string()],
        type_tag: None,
    };
    vec![
        mesh("box", "create_box"),
        mesh("sphere", "create_sphere"),
        mesh("cylinder", "create_cylinder"),
        mesh("capsule", "create_capsule"),
        mesh("plane", "create_plane"),
        mesh("model", "load_model"),
        mesh("character", "load_character"),
        FamilyConfig {
            prefix: "sound".to_string(),
            identity_field: default_identity_field(),
            node_types: vec!["play_sound".to_string()],
            type_tag: Some("Sound".to_string()),
        },
        FamilyConfig {
            prefix: "instrument".to_string(),
            identity_field: "INSTRUMENT".to_string(),
            node_types: vec!["create_instrument".to_string()],
            type_tag: Some("Instrument".to_string()),
        },
    ]
}

/// One naming family and the block types that create its objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyConfig {
    /// Name prefix, e.g. `sphere` for `sphere1`, `sphere2`, ...
    pub prefix: String,

    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// Block type tags that create objects of this family.
    pub node_types: Vec<String>,

    /// Type tag for bindings minted without a template.
    #[serde(default)]
    pub type_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_families")]
    pub families: Vec<FamilyConfig>,

    #[serde(default = "default_max_mint_attempts")]
    pub max_mint_attempts: u32,

    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            families: default_families(),
            max_mint_attempts: default_max_mint_attempts(),
            max_diagnostics: default_max_diagnostics(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse engine config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_mint_attempts == 0 {
            return Err("maxMintAttempts must be positive".to_string());
        }
        let mut seen_types = std::collections::HashSet::new();
        for family in &self.families {
            if family.prefix.is_empty() {
                return Err("Family prefix must not be empty".to_string());
            }
            if family.prefix.ends_with(|c: char| c.is_ascii_digit()) {
                return Err(format!(
                    "Family prefix '{}' must not end in a digit",
                    family.prefix
                ));
            }
            if family.identity_field.is_empty() {
                return Err(format!("Family '{}' has an empty identity field", family.prefix));
            }
            for node_type in &family.node_types {
                if !seen_types.insert(node_type.as_str()) {
                    return Err(format!("Block type '{}' belongs to two families", node_type));
                }
            }
        }
        Ok(())
    }

    pub fn family(&self, prefix: &str) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.prefix == prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.families.iter().map(|f| f.prefix.as_str())
    }

    /// Resolve a block type to its node kind.
    pub fn kind_for(&self, node_type: &str) -> NodeKind {
        self.families
            .iter()
            .find(|f| f.node_types.iter().any(|t| t == node_type))
            .map(|f| {
                NodeKind::Creator(IdentitySlot {
                    family: f.prefix.clone(),
                    field: f.identity_field.clone(),
                    type_tag: f.type_tag.clone(),
                })
            })
            .unwrap_or(NodeKind::Statement)
    }
}
