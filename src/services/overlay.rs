use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::MapStyle;
use crate::models::metadata::{Metadata, UserObjectKind, UserScalebar};
use crate::models::report::BoxProjection;
use crate::services::transform::PageTransform;

/// Diagnostic style that gets a 10 x 10 raster drawn over the map.
pub const RASTER_STYLE: &str = "raster10";

/// File references starting with this prefix point into the shared markers directory.
pub const DEFAULT_ASSET_PREFIX: &str = "Printmaps";

/// EPSG code used when a map has no explicit projection.
pub const LEGACY_PROJECTION: &str = "3857";

const MAP_END_TAG: &str = "</Map>";

/// Nature length (m) of a scale bar converted to page millimeters at `1:scale`.
pub fn scalebar_length_mm(nature_length: f64, scale: u32) -> f64 {
    nature_length * 1000.0 / f64::from(scale)
}

fn projection_srs(projection: &str) -> String {
    let code = if projection.is_empty() {
        LEGACY_PROJECTION
    } else {
        projection
    };
    format!("+init=epsg:{code}")
}

/// Style and layer blocks appended to a base Mapnik style, one line per entry.
#[derive(Debug, Default)]
pub struct OverlayDocument {
    lines: Vec<String>,
}

impl OverlayDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// All overlay blocks for one map: raster grid (diagnostic style only), user
    /// objects in declaration order, then the scale bar.
    pub fn for_map(metadata: &Metadata, bbox: BoxProjection) -> Self {
        let transform = PageTransform::new(bbox, metadata.print_width, metadata.print_height);
        let srs = projection_srs(&metadata.projection);
        let mut doc = Self::new();

        if metadata.style == RASTER_STYLE {
            doc.push_raster_grid(bbox, &srs);
        }
        doc.push_user_objects(metadata, &transform, &srs);
        if let Some(scalebar) = &metadata.user_scalebar {
            doc.push_scalebar(scalebar, metadata.scale, &transform, &srs);
        }
        doc
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Grid of 9 horizontal and 9 vertical lines splitting `bbox` into 10 x 10 cells.
    pub fn push_raster_grid(&mut self, bbox: BoxProjection, srs: &str) {
        self.push_style(RASTER_STYLE, "<LineSymbolizer stroke='grey' stroke-width='1' />");
        let mut rows = Vec::with_capacity(18);
        let x_step = bbox.width() / 10.0;
        let y_step = bbox.height() / 10.0;
        for index in 1..10 {
            let y = bbox.y_min + f64::from(index) * y_step;
            let x = bbox.x_min + f64::from(index) * x_step;
            rows.push(format!(
                "{index}|horizontal|LINESTRING({:.6} {:.6}, {:.6} {:.6})",
                bbox.x_min, y, bbox.x_max, y
            ));
            rows.push(format!(
                "{index}|vertical|LINESTRING({:.6} {:.6}, {:.6} {:.6})",
                x, bbox.y_min, x, bbox.y_max
            ));
        }
        self.push_inline_layer(RASTER_STYLE, srs, &rows);
    }

    pub fn push_user_objects(&mut self, metadata: &Metadata, transform: &PageTransform, srs: &str) {
        for (index, object) in metadata.user_objects.iter().enumerate() {
            let name = format!("userobject-{index}");
            self.push_style(&name, &object.style);
            match object.kind() {
                UserObjectKind::Item { well_known_text } => {
                    let row = format!("1|{name}|{}", transform.apply(well_known_text));
                    self.push_inline_layer(&name, srs, &[row]);
                }
                UserObjectKind::Data {
                    srs: object_srs,
                    source_type,
                    file,
                    layer,
                } => {
                    self.push(format!("<Layer name='{name}' srs='{object_srs}'>"));
                    self.push(format!("  <StyleName>{name}</StyleName>"));
                    self.push("  <Datasource>");
                    self.push(format!("    <Parameter name='type'>{source_type}</Parameter>"));
                    self.push(format!("    <Parameter name='file'>{file}</Parameter>"));
                    if let Some(layer) = layer {
                        self.push(format!("    <Parameter name='layer'>{layer}</Parameter>"));
                    }
                    self.push("  </Datasource>");
                    self.push("</Layer>");
                }
            }
        }
    }

    /// Horizontal bar starting at the configured page position. Skipped without a length.
    pub fn push_scalebar(
        &mut self,
        scalebar: &UserScalebar,
        scale: u32,
        transform: &PageTransform,
        srs: &str,
    ) {
        if scalebar.nature_length == 0.0 || scale == 0 {
            return;
        }
        let length = scalebar_length_mm(scalebar.nature_length, scale);
        let wkt = format!(
            "LINESTRING({} {}, {} {})",
            scalebar.x_pos,
            scalebar.y_pos,
            scalebar.x_pos + length,
            scalebar.y_pos
        );
        let name = "userscalebar";
        self.push_style(name, &scalebar.style);
        self.push_inline_layer(name, srs, &[format!("1|{name}|{}", transform.apply(&wkt))]);
    }

    /// Resolve relative file references. Values starting with [`DEFAULT_ASSET_PREFIX`]
    /// go to `markers_dir`, everything else to the map's own directory.
    pub fn rewrite_file_references(&mut self, map_dir: &Path, markers_dir: &Path) {
        for line in &mut self.lines {
            for quote in ['\'', '"'] {
                let parameter_token = format!("name={quote}file{quote}>");
                if let Some(rewritten) = rewrite_after(line, &parameter_token, |_| map_dir) {
                    *line = rewritten;
                }
                let attribute_token = format!("file={quote}");
                let target = |rest: &str| {
                    if rest.starts_with(DEFAULT_ASSET_PREFIX) {
                        markers_dir
                    } else {
                        map_dir
                    }
                };
                if let Some(rewritten) = rewrite_after(line, &attribute_token, target) {
                    *line = rewritten;
                }
            }
        }
    }

    /// Insert the overlay just before the closing `</Map>` line of `base`.
    pub fn merge_into(&self, base: &str) -> String {
        let mut output = String::with_capacity(base.len() + self.lines.iter().map(|l| l.len() + 1).sum::<usize>());
        let mut inserted = false;
        for line in base.lines() {
            if !inserted && line.contains(MAP_END_TAG) {
                for overlay in &self.lines {
                    output.push_str(overlay);
                    output.push('\n');
                }
                inserted = true;
            }
            output.push_str(line);
            output.push('\n');
        }
        output
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn push_style(&mut self, name: &str, rule: &str) {
        self.push("");
        self.push(format!("<Style name='{name}'>"));
        self.push("  <Rule>");
        self.push(format!("    {rule}"));
        self.push("  </Rule>");
        self.push("</Style>");
        self.push("");
    }

    fn push_inline_layer(&mut self, name: &str, srs: &str, rows: &[String]) {
        self.push(format!("<Layer name='{name}' srs='{srs}'>"));
        self.push(format!("  <StyleName>{name}</StyleName>"));
        self.push("  <Datasource>");
        self.push("    <Parameter name='type'>csv</Parameter>");
        self.push("    <Parameter name='inline'>");
        self.push("id|name|wkt");
        for row in rows {
            self.push(row.as_str());
        }
        self.push("    </Parameter>");
        self.push("  </Datasource>");
        self.push("</Layer>");
    }
}

/// Split `line` after the first `token` and prefix the remainder with a directory.
fn rewrite_after<'a>(line: &str, token: &str, dir_for: impl Fn(&str) -> &'a Path) -> Option<String> {
    let start = line.find(token)? + token.len();
    let (head, rest) = line.split_at(start);
    let dir = dir_for(rest);
    let resolved = dir.join(rest.trim_start_matches('/'));
    Some(format!("{head}{}", resolved.display()))
}

/// Location of the generated style document, next to its base style.
pub fn style_document_path(style: &MapStyle, id: Uuid) -> PathBuf {
    style.xml_path.join(format!("{id}-{}", style.xml_file))
}

/// Read the base style, merge the overlay and write the per-map style document.
pub async fn write_style_document(
    style: &MapStyle,
    id: Uuid,
    overlay: &OverlayDocument,
) -> Result<PathBuf, std::io::Error> {
    let base = tokio::fs::read_to_string(style.xml()).await?;
    let path = style_document_path(style, id);
    tokio::fs::write(&path, overlay.merge_into(&base)).await?;
    Ok(path)
}
