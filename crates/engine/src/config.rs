use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::patterns::PatternDraft;
use crate::rules::RuleDraft;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub min_confidence: f32,
    pub limit: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub max_samples: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { max_samples: 10 }
    }
}

/// Engine settings plus the patterns and rules to seed it with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recommend: RecommendConfig,
    pub preview: PreviewConfig,
    pub patterns: Vec<PatternDraft>,
    pub rules: Vec<RuleDraft>,
}

impl EngineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self> {
        Ok(toml::from_str(toml_content)?)
    }
}
