use std::path::PathBuf;

use super::mapstate::BuildOutcome;
use super::metadata::MapData;

/// Message stored for a successful build.
pub const BUILD_SUCCESSFUL_MESSAGE: &str = "map build successful";

/// An order file taken out of the queue into a worker's private directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedOrder {
    /// File name the order had in the queue directory
    pub name: String,
    /// Location of the order document after the claim
    pub path: PathBuf,
}

/// Result of one pipeline run, as recorded in the map state.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub outcome: BuildOutcome,
    pub message: String,
}

impl BuildSummary {
    pub fn successful() -> Self {
        Self {
            outcome: BuildOutcome::Successful,
            message: BUILD_SUCCESSFUL_MESSAGE.to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: BuildOutcome::Failed,
            message: message.into(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.outcome == BuildOutcome::Successful
    }
}

/// A pipeline run that reached the end, successful or not.
#[derive(Debug, Clone)]
pub struct CompletedBuild {
    pub order: MapData,
    pub summary: BuildSummary,
}
