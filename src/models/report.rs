use serde::{Deserialize, Serialize};

/// Map dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct BoxPixel {
    pub width: u32,
    pub height: u32,
}

/// Envelope in target projection units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BoxProjection {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoxProjection {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// Geographic envelope (EPSG:4326).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BoxWgs84 {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

/// Geometry reported by the renderer in info mode. Lives for one build attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendererReport {
    pub scale: f64,
    pub scale_factor: f64,
    pub pixels: BoxPixel,
    pub projected: BoxProjection,
    pub wgs84: BoxWgs84,
    pub layers: Vec<String>,
}
