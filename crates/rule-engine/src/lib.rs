//! Fault Rule Engine
//!
//! Evaluates telemetry samples against configured rule sets: plain
//! threshold rules with optional prerequisites and sustain durations,
//! percentage-over-window rate rules, and the tiered master rules that
//! can suppress everything else for a unit.

mod condition;
mod master;
mod matcher;
mod rate;
mod rule;

pub use condition::Condition;
pub use master::{arbitrate, MasterArbitration, MasterMatch};
pub use matcher::{match_sample, MatchContext};
pub use rate::evaluate_rate;
pub use rule::{
    DurationMode, DurationSpec, MasterRule, Prerequisite, RuleConfig, RuleSet, SimpleRule,
    SourceTable,
};
