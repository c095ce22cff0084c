//! Page-millimeter to projection coordinate transformation for WKT literals.
//!
//! The transformation is linear per axis and driven by the envelope the renderer
//! reported for the page. It only looks at numbers, so any WKT geometry type
//! (POINT, LINESTRING, POLYGON, MULTI*, ...) passes through unchanged apart from
//! its coordinates.

use crate::models::report::BoxProjection;

#[derive(Clone, Copy, PartialEq)]
enum Axis {
    X,
    Y,
}

/// Linear mapping from page millimeters to projection units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    bbox: BoxProjection,
    units_per_mm_x: f64,
    units_per_mm_y: f64,
}

impl PageTransform {
    pub fn new(bbox: BoxProjection, page_width_mm: f64, page_height_mm: f64) -> Self {
        Self {
            bbox,
            units_per_mm_x: bbox.width() / page_width_mm,
            units_per_mm_y: bbox.height() / page_height_mm,
        }
    }

    pub fn x(&self, mm: f64) -> f64 {
        self.bbox.x_min + mm * self.units_per_mm_x
    }

    pub fn y(&self, mm: f64) -> f64 {
        self.bbox.y_min + mm * self.units_per_mm_y
    }

    /// Rewrite every numeric token of `literal`, alternating X and Y starting with X.
    ///
    /// A numeric token is a maximal run of ASCII digits and dots; everything else is
    /// copied verbatim. Malformed tokens (e.g. `1.2.3`) are logged and read as zero.
    pub fn apply(&self, literal: &str) -> String {
        let mut output = String::with_capacity(literal.len() * 2);
        let mut token = String::new();
        let mut axis = Axis::X;

        for ch in literal.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                token.push(ch);
                continue;
            }
            if !token.is_empty() {
                self.emit(&mut output, &token, &mut axis);
                token.clear();
            }
            output.push(ch);
        }
        if !token.is_empty() {
            self.emit(&mut output, &token, &mut axis);
        }

        output
    }

    fn emit(&self, output: &mut String, token: &str, axis: &mut Axis) {
        let raw = token.parse::<f64>().unwrap_or_else(|e| {
            tracing::warn!(token = %token, error = %e, "Malformed coordinate in geometry, using 0");
            0.0
        });
        let value = match axis {
            Axis::X => {
                *axis = Axis::Y;
                self.x(raw)
            }
            Axis::Y => {
                *axis = Axis::X;
                self.y(raw)
            }
        };
        output.push_str(&format!("{value:.1}"));
    }
}

/// Transform a page-space WKT literal into projection units.
pub fn transform(literal: &str, bbox: BoxProjection, page_width_mm: f64, page_height_mm: f64) -> String {
    PageTransform::new(bbox, page_width_mm, page_height_mm).apply(literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoxProjection {
        BoxProjection {
            x_min: 1000.0,
            y_min: 2000.0,
            x_max: 3000.0,
            y_max: 6000.0,
        }
    }

    fn non_numeric(s: &str) -> String {
        s.chars().filter(|c| !(c.is_ascii_digit() || *c == '.')).collect()
    }

    #[test]
    fn test_point_transformed() {
        // 2000 units over 200 mm = 10/mm, 4000 units over 400 mm = 10/mm
        let out = transform("POINT(10 20)", bbox(), 200.0, 400.0);
        assert_eq!(out, "POINT(1100.0 2200.0)");
    }

    #[test]
    fn test_alternates_x_then_y() {
        let out = transform("LINESTRING(0 0, 200 400, 100 100)", bbox(), 200.0, 400.0);
        assert_eq!(out, "LINESTRING(1000.0 2000.0, 3000.0 6000.0, 2000.0 3000.0)");
    }

    #[test]
    fn test_axis_spans_are_independent() {
        // x: 2000 units over 100 mm, y: 4000 units over 400 mm
        let out = transform("POINT(50 50)", bbox(), 100.0, 400.0);
        assert_eq!(out, "POINT(2000.0 2500.0)");
    }

    #[test]
    fn test_structure_preserved() {
        let input = "MULTIPOLYGON(((10 10, 20 10, 20 20, 10 10)), ((30.5 30, 40 30, 40 40, 30.5 30)))";
        let out = transform(input, bbox(), 200.0, 400.0);
        assert_eq!(non_numeric(&out), non_numeric(input));
    }

    #[test]
    fn test_no_numbers_unchanged() {
        assert_eq!(transform("GEOMETRYCOLLECTION EMPTY", bbox(), 200.0, 400.0), "GEOMETRYCOLLECTION EMPTY");
        assert_eq!(transform("", bbox(), 200.0, 400.0), "");
    }

    #[test]
    fn test_malformed_token_reads_as_zero() {
        let out = transform("POINT(1.2.3 20)", bbox(), 200.0, 400.0);
        assert_eq!(out, "POINT(1000.0 2200.0)");
    }

    #[test]
    fn test_trailing_token_consumed() {
        let out = transform("10 20", bbox(), 200.0, 400.0);
        assert_eq!(out, "1100.0 2200.0");
    }
}
