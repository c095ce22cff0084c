//! Fixtures: map documents and stand-in scripts for the external tools
#![allow(dead_code)]

use printmaps_buildservice::models::metadata::{MapData, MapDocument, Metadata};
use uuid::Uuid;

/// Name of the base style registered in every test environment.
pub const STYLE_NAME: &str = "osm-carto";

/// Minimal Mapnik base style; overlays are merged before `</Map>`.
pub const BASE_STYLE_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Map srs=\"+init=epsg:3857\">\n</Map>\n";

/// Renderer that reports a fixed geometry in info mode and writes its last
/// argument in build mode.
pub const RENDERER_OK: &str = r#"#!/bin/sh
for last; do :; done
case " $* " in
  *" --info "*)
    echo "scale=1.37348285369"
    echo "scale_factor=3.30760749724"
    echo "size=3508,4961"
    echo "bbox=Box2d(846724.854897,6787791.30045,851543.032747,6794605.14888)"
    echo "bbox_wgs84=Box2d(7.60625878598,51.9317329752,7.64954121402,51.9694590903)"
    echo "layers=landcover,water,roads"
    ;;
  *)
    echo "rendered map" > "$last"
    ;;
esac
"#;

/// Renderer that fails with a Mapnik runtime error.
pub const RENDERER_RUNTIME_ERROR: &str = r#"#!/bin/sh
echo "Traceback (most recent call last):" >&2
echo "RuntimeError: bad style" >&2
exit 1
"#;

/// `zip -j <archive> <file>`
pub const ZIP_OK: &str = r#"#!/bin/sh
cp "$3" "$2"
"#;

pub const ZIP_FAILS: &str = r#"#!/bin/sh
echo "zip error: nothing to do" >&2
exit 12
"#;

/// Renderer whose info output stops after the projected bounding box.
pub const RENDERER_WITHOUT_WGS84: &str = r#"#!/bin/sh
for last; do :; done
case " $* " in
  *" --info "*)
    echo "scale=1.37348285369"
    echo "scale_factor=3.30760749724"
    echo "size=3508,4961"
    echo "bbox=Box2d(846724.854897,6787791.30045,851543.032747,6794605.14888)"
    echo "layers=landcover,water,roads"
    ;;
  *)
    echo "rendered map" > "$last"
    ;;
esac
"#;

pub const PDFTK_FAILS: &str = r#"#!/bin/sh
echo "Error: Unexpected Exception in open_reader() /tmp/secret/printmaps.pdf" >&2
exit 3
"#;

/// `pdftk <in> update_info <info> output <out>`
pub const PDFTK_OK: &str = r#"#!/bin/sh
cp "$1" "$5"
"#;

/// Metadata with every required field set.
pub fn complete_metadata(format: &str) -> Metadata {
    Metadata {
        fileformat: format.to_string(),
        scale: 25000,
        print_width: 210.0,
        print_height: 297.0,
        latitude: 51.9506,
        longitude: 7.6279,
        style: STYLE_NAME.to_string(),
        projection: "25832".to_string(),
        ..Default::default()
    }
}

pub fn map_data(metadata: Metadata) -> MapData {
    MapDocument::new(Uuid::new_v4(), metadata)
}
