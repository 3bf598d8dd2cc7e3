//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The closed set of analysis stages and their static properties
//! - Stage and run status enums
//! - Stage results and their formatted structure

mod result;
mod stage;
mod status;

pub use result::{FormattedResult, Metric, Section, SectionContent, StageResult};
pub use stage::{Stage, StageKind, StagePrompt, OPTIONAL_STAGES, REQUIRED_STAGES};
pub use status::{RunStatus, StageStatus};
