use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Resource type carried in every map document envelope.
pub const MAP_RESOURCE_TYPE: &str = "maps";

/// Output formats the renderer can produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Pdf,
    Svg,
}

impl OutputFormat {
    /// Raster output renders at print resolution, vector output at 72 ppi.
    pub fn pixels_per_inch(self) -> u32 {
        match self {
            OutputFormat::Png => 300,
            OutputFormat::Pdf | OutputFormat::Svg => 72,
        }
    }

    /// Whether document properties are embedded after rendering.
    pub fn needs_document_properties(self) -> bool {
        self == OutputFormat::Pdf
    }
}

/// JSON:API-like envelope shared with the web service: `{"Data": {"Type", "ID", "Attributes"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapDocument<T> {
    #[serde(rename = "Data")]
    pub data: MapDocumentData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapDocumentData<T> {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "Attributes")]
    pub attributes: T,
}

impl<T> MapDocument<T> {
    pub fn new(id: Uuid, attributes: T) -> Self {
        Self {
            data: MapDocumentData {
                kind: MAP_RESOURCE_TYPE.to_string(),
                id,
                attributes,
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.data.id
    }

    pub fn attributes(&self) -> &T {
        &self.data.attributes
    }
}

/// Metadata document (what to build). Also the body of a build order.
pub type MapData = MapDocument<Metadata>;

/// Description of the map. Fields are filled incrementally by the API layer,
/// so every attribute tolerates its zero value until an order is submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "PascalCase", default)]
pub struct Metadata {
    #[garde(custom(known_format))]
    pub fileformat: String,

    #[garde(range(min = 1))]
    pub scale: u32,

    #[garde(custom(non_zero))]
    pub print_width: f64,

    #[garde(custom(non_zero))]
    pub print_height: f64,

    #[garde(custom(non_zero))]
    pub latitude: f64,

    #[garde(custom(non_zero))]
    pub longitude: f64,

    #[garde(length(min = 1))]
    pub style: String,

    #[garde(length(min = 1))]
    pub projection: String,

    #[garde(skip)]
    pub hide_layers: String,

    #[garde(skip)]
    pub user_objects: Vec<UserObject>,

    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_scalebar: Option<UserScalebar>,

    /// Uploaded user files as `name,size[,name,size...]` (read-only, filled by the store)
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_files: Option<String>,
}

fn known_format(value: &str, _ctx: &()) -> garde::Result {
    value
        .parse::<OutputFormat>()
        .map(|_| ())
        .map_err(|_| garde::Error::new(format!("unsupported file format '{value}'")))
}

fn non_zero(value: &f64, _ctx: &()) -> garde::Result {
    if *value == 0.0 {
        return Err(garde::Error::new("required"));
    }
    Ok(())
}

impl Metadata {
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.fileformat.parse().ok()
    }
}

/// A user defined map object: either a data object (style + external data source)
/// or an item object (style + well-known-text geometry in page millimeters).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserObject {
    pub style: String,
    #[serde(rename = "SRS", skip_serializing_if = "String::is_empty")]
    pub srs: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub layer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub well_known_text: String,
}

impl UserObject {
    pub fn kind(&self) -> UserObjectKind<'_> {
        if self.well_known_text.is_empty() {
            UserObjectKind::Data {
                srs: &self.srs,
                source_type: &self.r#type,
                file: &self.file,
                layer: (!self.layer.is_empty()).then_some(self.layer.as_str()),
            }
        } else {
            UserObjectKind::Item {
                well_known_text: &self.well_known_text,
            }
        }
    }
}

/// Borrowed view distinguishing the two user object flavours.
#[derive(Debug, PartialEq)]
pub enum UserObjectKind<'a> {
    Data {
        srs: &'a str,
        source_type: &'a str,
        file: &'a str,
        layer: Option<&'a str>,
    },
    Item {
        well_known_text: &'a str,
    },
}

/// User defined scale bar. Length in nature meters, position in page millimeters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserScalebar {
    pub style: String,
    pub nature_length: f64,
    pub x_pos: f64,
    pub y_pos: f64,
}
