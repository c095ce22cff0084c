use std::path::Path;

use crate::config::AppConfig;
use crate::models::metadata::{Metadata, OutputFormat};
use crate::models::report::{BoxPixel, BoxProjection, BoxWgs84, RendererReport};
use crate::services::command::run_command;

/// Marker preceding the user facing part of a Mapnik error.
pub const RUNTIME_ERROR_MARKER: &str = "RuntimeError:";

/// Parameters shared by the info and the build invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub hide_layers: &'a str,
    /// EPSG code; empty selects the renderer's legacy fixed projection
    pub projection: &'a str,
    pub scale: u32,
    pub width_mm: f64,
    pub height_mm: f64,
    pub ppi: u32,
    pub longitude: f64,
    pub latitude: f64,
    pub style: &'a Path,
    pub output: &'a Path,
}

impl<'a> RenderRequest<'a> {
    pub fn new(metadata: &'a Metadata, format: OutputFormat, style: &'a Path, output: &'a Path) -> Self {
        Self {
            hide_layers: &metadata.hide_layers,
            projection: &metadata.projection,
            scale: metadata.scale,
            width_mm: metadata.print_width,
            height_mm: metadata.print_height,
            ppi: format.pixels_per_inch(),
            longitude: metadata.longitude,
            latitude: metadata.latitude,
            style,
            output,
        }
    }

    pub fn with_style(&self, style: &'a Path) -> Self {
        Self { style, ..self.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Report the computed geometry and stop
    Info,
    /// Render the final output file
    Build,
}

/// Command line arguments for one renderer invocation.
pub fn renderer_args(request: &RenderRequest<'_>, mode: RenderMode) -> Vec<String> {
    let mut args = vec!["--debug".to_string()];
    if mode == RenderMode::Info {
        args.push("--info".to_string());
    }
    // single tile, the whole page is rendered in one pass
    args.extend(["--tiles".to_string(), "1".to_string()]);
    if !request.hide_layers.is_empty() {
        args.push("--hide-layers".to_string());
        args.push(request.hide_layers.to_string());
    }
    if !request.projection.is_empty() {
        args.push("--projection".to_string());
        args.push(request.projection.to_string());
    }
    args.extend([
        "--scale".to_string(),
        request.scale.to_string(),
        "--size".to_string(),
        request.width_mm.to_string(),
        request.height_mm.to_string(),
        "--ppi".to_string(),
        request.ppi.to_string(),
        "--center".to_string(),
        request.longitude.to_string(),
        request.latitude.to_string(),
        request.style.display().to_string(),
        request.output.display().to_string(),
    ]);
    args
}

/// Driver for the external Nik4/Mapnik renderer.
pub struct RendererDriver {
    command: String,
    verbose: bool,
}

impl RendererDriver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            command: config.renderer_command.clone(),
            verbose: config.test_mode,
        }
    }

    /// Run in info mode and parse the reported geometry.
    pub async fn info(&self, request: &RenderRequest<'_>) -> Result<ParsedReport, RendererError> {
        let output = self.invoke(request, RenderMode::Info).await?;
        Ok(parse_report(&output))
    }

    /// Run in build mode, producing `request.output`.
    pub async fn build(&self, request: &RenderRequest<'_>) -> Result<(), RendererError> {
        self.invoke(request, RenderMode::Build).await.map(|_| ())
    }

    async fn invoke(&self, request: &RenderRequest<'_>, mode: RenderMode) -> Result<String, RendererError> {
        let args = renderer_args(request, mode);
        let result = run_command(&self.command, &args, self.verbose)
            .await
            .map_err(RendererError::Spawn)?;

        if result.success() {
            return Ok(result.output);
        }

        let message = match extract_runtime_error(&result.output) {
            Some(message) => elide_paths(&message),
            None => format!("renderer failed ({})", result.status),
        };
        Err(RendererError::Failed { message })
    }
}

/// Text following the first `RuntimeError:` marker, trimmed.
pub fn extract_runtime_error(output: &str) -> Option<String> {
    let start = output.find(RUNTIME_ERROR_MARKER)? + RUNTIME_ERROR_MARKER.len();
    Some(output[start..].trim().to_string())
}

/// Cut everything between the first and the last `/` (inclusive) out of `message`.
pub fn elide_paths(message: &str) -> String {
    match (message.find('/'), message.rfind('/')) {
        (Some(first), Some(last)) => format!("{}{}", &message[..first], &message[last + 1..]),
        _ => message.to_string(),
    }
}

/// Outcome of parsing the info-mode output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReport {
    /// All lines present, including the layer list
    Complete(RendererReport),
    /// Geometry complete, no layer line (style without dynamic layers)
    WithoutLayers(RendererReport),
    /// A line did not match; `partial` holds what was parsed before it
    Invalid {
        partial: RendererReport,
        error: ReportError,
    },
}

impl ParsedReport {
    pub fn report(&self) -> &RendererReport {
        match self {
            ParsedReport::Complete(report) | ParsedReport::WithoutLayers(report) => report,
            ParsedReport::Invalid { partial, .. } => partial,
        }
    }

    pub fn into_report(self) -> RendererReport {
        match self {
            ParsedReport::Complete(report) | ParsedReport::WithoutLayers(report) => report,
            ParsedReport::Invalid { partial, .. } => partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReportError {
    #[error("Expected renderer output not found")]
    MissingOutput,

    #[error("Unexpected renderer output for {field}: '{line}'")]
    Line { field: &'static str, line: String },
}

/// Parse the fixed-format block starting at the first `scale=` line:
///
/// ```text
/// scale=1.37348285369
/// scale_factor=3.30760749724
/// size=3508,4961
/// bbox=Box2d(846724.854897,6787791.30045,851543.032747,6794605.14888)
/// bbox_wgs84=Box2d(7.60625878598,51.9317329752,7.64954121402,51.9694590903)
/// layers=coast-poly,waterarea,buildings,highways
/// ```
pub fn parse_report(output: &str) -> ParsedReport {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    let Some(start) = lines.iter().position(|l| l.starts_with("scale=")) else {
        return ParsedReport::Invalid {
            partial: RendererReport::default(),
            error: ReportError::MissingOutput,
        };
    };
    let mut lines = lines[start..].iter().copied();
    let mut report = RendererReport::default();

    macro_rules! parse_line {
        ($field:literal, $parser:expr) => {{
            let line = lines.next().unwrap_or_default();
            match $parser(line) {
                Some(value) => value,
                None => {
                    return ParsedReport::Invalid {
                        partial: report,
                        error: ReportError::Line {
                            field: $field,
                            line: line.to_string(),
                        },
                    }
                }
            }
        }};
    }

    let scale = parse_line!("scale", |l: &str| l.strip_prefix("scale=")?.parse::<f64>().ok());
    report.scale = scale;
    let scale_factor = parse_line!("scale_factor", |l: &str| l
        .strip_prefix("scale_factor=")?
        .parse::<f64>()
        .ok());
    report.scale_factor = scale_factor;
    let pixels = parse_line!("size", parse_size);
    report.pixels = pixels;
    let projected = parse_line!("bbox", |l: &str| {
        let [x_min, y_min, x_max, y_max] = parse_box2d(l, "bbox=")?;
        Some(BoxProjection { x_min, y_min, x_max, y_max })
    });
    report.projected = projected;
    let wgs84 = parse_line!("bbox_wgs84", |l: &str| {
        let [lon_min, lat_min, lon_max, lat_max] = parse_box2d(l, "bbox_wgs84=")?;
        Some(BoxWgs84 { lon_min, lat_min, lon_max, lat_max })
    });
    report.wgs84 = wgs84;

    match lines.next().filter(|l| !l.trim().is_empty()) {
        None => ParsedReport::WithoutLayers(report),
        Some(line) => match line.strip_prefix("layers=") {
            Some(layers) => {
                report.layers = layers
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                ParsedReport::Complete(report)
            }
            None => ParsedReport::Invalid {
                partial: report,
                error: ReportError::Line {
                    field: "layers",
                    line: line.to_string(),
                },
            },
        },
    }
}

fn parse_size(line: &str) -> Option<BoxPixel> {
    let (width, height) = line.strip_prefix("size=")?.split_once(',')?;
    Some(BoxPixel {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

fn parse_box2d(line: &str, prefix: &str) -> Option<[f64; 4]> {
    let inner = line
        .strip_prefix(prefix)?
        .strip_prefix("Box2d(")?
        .strip_suffix(')')?;
    let values: Vec<f64> = inner
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    values.try_into().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Cannot start renderer: {0}")]
    Spawn(std::io::Error),

    #[error("{message}")]
    Failed { message: String },
}

impl RendererError {
    /// Message suitable for the map state (no internal paths).
    pub fn user_message(&self) -> String {
        match self {
            RendererError::Spawn(_) => "renderer not available".to_string(),
            RendererError::Failed { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_OUTPUT: &str = "\
some debug chatter
scale=1.37348285369
scale_factor=3.30760749724
size=3508,4961
bbox=Box2d(846724.854897,6787791.30045,851543.032747,6794605.14888)
bbox_wgs84=Box2d(7.60625878598,51.9317329752,7.64954121402,51.9694590903)
layers=coast-poly,waterarea,buildings,highways
";

    #[test]
    fn test_parse_complete_report() {
        let ParsedReport::Complete(report) = parse_report(INFO_OUTPUT) else {
            panic!("expected complete report");
        };
        assert_eq!(report.scale, 1.37348285369);
        assert_eq!(report.pixels, BoxPixel { width: 3508, height: 4961 });
        assert_eq!(report.projected.x_min, 846724.854897);
        assert_eq!(report.projected.y_max, 6794605.14888);
        assert_eq!(report.wgs84.lat_max, 51.9694590903);
        assert_eq!(report.layers, vec!["coast-poly", "waterarea", "buildings", "highways"]);
    }

    #[test]
    fn test_missing_layer_line_tolerated() {
        let output = INFO_OUTPUT.replace("layers=coast-poly,waterarea,buildings,highways\n", "");
        let parsed = parse_report(&output);
        assert!(matches!(parsed, ParsedReport::WithoutLayers(_)));
        assert_eq!(parsed.report().pixels.width, 3508);
    }

    #[test]
    fn test_empty_layer_list() {
        let output = INFO_OUTPUT.replace("layers=coast-poly,waterarea,buildings,highways", "layers=");
        let ParsedReport::Complete(report) = parse_report(&output) else {
            panic!("expected complete report");
        };
        assert!(report.layers.is_empty());
    }

    #[test]
    fn test_mismatching_line_keeps_partial_report() {
        let output = INFO_OUTPUT.replace(
            "bbox_wgs84=Box2d(7.60625878598,51.9317329752,7.64954121402,51.9694590903)",
            "bbox_wgs84=None",
        );
        let ParsedReport::Invalid { partial, error } = parse_report(&output) else {
            panic!("expected invalid report");
        };
        assert_eq!(partial.projected.x_max, 851543.032747);
        assert_eq!(partial.wgs84, BoxWgs84::default());
        assert!(matches!(error, ReportError::Line { field: "bbox_wgs84", .. }));
    }

    #[test]
    fn test_no_report_in_output() {
        let parsed = parse_report("Traceback (most recent call last):\n");
        assert!(matches!(
            parsed,
            ParsedReport::Invalid { error: ReportError::MissingOutput, .. }
        ));
    }

    #[test]
    fn test_extract_runtime_error() {
        let output = "Traceback ...\nRuntimeError: bad style\n";
        assert_eq!(extract_runtime_error(output).as_deref(), Some("bad style"));
        assert_eq!(extract_runtime_error("Segmentation fault"), None);
    }

    #[test]
    fn test_elide_paths() {
        assert_eq!(
            elide_paths("Unable to open '/srv/printmaps/maps/abc/track.gpx' in layer"),
            "Unable to open 'track.gpx' in layer"
        );
        assert_eq!(elide_paths("no paths here"), "no paths here");
    }

    #[test]
    fn test_info_args() {
        let metadata = Metadata {
            fileformat: "png".to_string(),
            scale: 10000,
            print_width: 297.0,
            print_height: 420.0,
            latitude: 51.9506,
            longitude: 7.6279,
            style: "osm-carto".to_string(),
            projection: "3857".to_string(),
            hide_layers: "admin-low-zoom,buildings".to_string(),
            ..Default::default()
        };
        let style = Path::new("/styles/mapnik.xml");
        let output = Path::new("/tmp/work/printmaps.png");
        let request = RenderRequest::new(&metadata, OutputFormat::Png, style, output);

        let args = renderer_args(&request, RenderMode::Info);
        assert_eq!(
            args,
            vec![
                "--debug", "--info", "--tiles", "1", "--hide-layers", "admin-low-zoom,buildings", "--projection", "3857",
                "--scale", "10000", "--size", "297", "420", "--ppi", "300", "--center", "7.6279",
                "51.9506", "/styles/mapnik.xml", "/tmp/work/printmaps.png",
            ]
        );

        let legacy = Metadata {
            projection: String::new(),
            hide_layers: String::new(),
            ..metadata.clone()
        };
        let request = RenderRequest::new(&legacy, OutputFormat::Pdf, style, output);
        let args = renderer_args(&request, RenderMode::Build);
        assert_eq!(args[..3], ["--debug", "--tiles", "1"]);
        assert!(!args.iter().any(|a| a == "--info" || a == "--projection" || a == "--hide-layers"));
        assert!(args.windows(2).any(|w| w == ["--ppi", "72"]));
    }
}
