//! Quality control: pure validation of records against a declarative rule table.

pub mod engine;
pub mod report;
pub mod rules;

pub use engine::{QualityRuleEngine, Validation};
pub use report::{KindQuality, QualityReport};
pub use rules::{default_device_rules, default_photophysics_rules, FieldRule, RuleSet};
