use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::MapDocument;
use super::report::{BoxPixel, BoxProjection, BoxWgs84};

/// State document of a map (build lifecycle).
pub type MapStateDocument = MapDocument<Mapstate>;

/// Tri-state outcome of the latest build attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuildOutcome {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "yes")]
    Successful,
    #[serde(rename = "no")]
    Failed,
}

/// Print size of the map in millimeters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BoxMillimeter {
    pub width: f64,
    pub height: f64,
}

/// Lifecycle record of a map. Timestamps are overwritten in the order
/// metadata -> order -> start -> complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Mapstate {
    #[serde(with = "rfc3339_or_empty")]
    pub map_metadata_written: Option<DateTime<Utc>>,
    #[serde(with = "rfc3339_or_empty")]
    pub map_order_submitted: Option<DateTime<Utc>>,
    #[serde(with = "rfc3339_or_empty")]
    pub map_build_started: Option<DateTime<Utc>>,
    #[serde(with = "rfc3339_or_empty")]
    pub map_build_completed: Option<DateTime<Utc>>,
    pub map_build_successful: BuildOutcome,
    pub map_build_message: String,
    pub map_build_box_millimeter: BoxMillimeter,
    pub map_build_box_pixel: BoxPixel,
    pub map_build_box_projection: BoxProjection,
    #[serde(rename = "MapBuildBoxWGS84")]
    pub map_build_box_wgs84: BoxWgs84,
}

impl Mapstate {
    pub fn record_metadata_written(&mut self, at: DateTime<Utc>) {
        self.map_metadata_written = Some(at);
    }

    /// A fresh order wipes everything a previous build left behind.
    pub fn record_order_submitted(&mut self, at: DateTime<Utc>) {
        self.map_order_submitted = Some(at);
        self.map_build_started = None;
        self.clear_outcome();
        self.map_build_box_millimeter = BoxMillimeter::default();
        self.map_build_box_pixel = BoxPixel::default();
        self.map_build_box_projection = BoxProjection::default();
        self.map_build_box_wgs84 = BoxWgs84::default();
    }

    pub fn record_build_started(&mut self, at: DateTime<Utc>) {
        self.map_build_started = Some(at);
        self.clear_outcome();
    }

    pub fn record_build_completed(
        &mut self,
        at: DateTime<Utc>,
        outcome: BuildOutcome,
        message: impl Into<String>,
    ) {
        self.map_build_completed = Some(at);
        self.map_build_successful = outcome;
        self.map_build_message = message.into();
    }

    pub fn is_successful(&self) -> bool {
        self.map_build_successful == BuildOutcome::Successful
    }

    fn clear_outcome(&mut self) {
        self.map_build_completed = None;
        self.map_build_successful = BuildOutcome::Unset;
        self.map_build_message.clear();
    }
}

/// `Option<DateTime<Utc>>` stored as an RFC 3339 string, empty when unset.
mod rfc3339_or_empty {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}
