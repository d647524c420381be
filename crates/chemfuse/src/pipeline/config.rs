use crate::config::Config;
use crate::quality::RuleSet;

pub struct PipelineConfig {
    pub min_confidence: f64,
    pub low_confidence: f64,
    pub review_enabled: bool,
    pub rules: RuleSet,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_confidence: config.recognition.min_confidence,
            low_confidence: config.recognition.low_confidence,
            review_enabled: config.review.enabled,
            rules: config.quality.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
