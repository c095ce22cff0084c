use chrono::{DateTime, Local};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::models::metadata::{Metadata, OutputFormat};
use crate::services::command::run_command;

/// Base name of the rendered artifact inside a workspace.
pub const MAP_BASENAME: &str = "printmaps";

const PDF_INFO_FILE: &str = "metadata.cfg";
const PDF_WITH_INFO: &str = "meta.pdf";

/// Rendered output file for `format` inside `workspace`.
pub fn map_file(workspace: &Path, format: OutputFormat) -> PathBuf {
    workspace.join(format!("{MAP_BASENAME}.{format}"))
}

/// `pdftk` info file with the document properties of a map.
pub fn pdf_info(metadata: &Metadata, created: DateTime<Local>) -> String {
    let entries = [
        ("Title", "Map image based on OpenStreetMap data".to_string()),
        ("Author", "http://www.printmaps-osm.de".to_string()),
        ("Subject", "(c) OpenStreetMap contributors".to_string()),
        (
            "Keywords",
            format!(
                "style='{}', lat='{:.6}', lon='{:.6}', scale='1:{}'",
                metadata.style, metadata.latitude, metadata.longitude, metadata.scale
            ),
        ),
        ("Creator", "Mapnik Toolkit 3.x (http://mapnik.org)".to_string()),
        // D:YYYYMMDDHHmmSS+HH'00'
        ("CreationDate", format!("D:{}'00'", created.format("%Y%m%d%H%M%S%:::z"))),
    ];

    entries
        .iter()
        .map(|(key, value)| format!("InfoBegin\nInfoKey:{key}\nInfoValue:{value}\n"))
        .collect()
}

/// Post-render steps: document properties, archive, publication.
pub struct Packager {
    pdftk: String,
    zip: String,
    verbose: bool,
}

impl Packager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            pdftk: config.pdftk_command.clone(),
            zip: config.zip_command.clone(),
            verbose: config.test_mode,
        }
    }

    /// Embed document properties into `workspace/printmaps.pdf` (in place).
    pub async fn add_pdf_properties(&self, workspace: &Path, metadata: &Metadata) -> Result<(), PackagingError> {
        let info = workspace.join(PDF_INFO_FILE);
        let source = map_file(workspace, OutputFormat::Pdf);
        let target = workspace.join(PDF_WITH_INFO);

        tokio::fs::write(&info, pdf_info(metadata, Local::now())).await?;

        let args: [&OsStr; 5] = [
            source.as_os_str(),
            OsStr::new("update_info"),
            info.as_os_str(),
            OsStr::new("output"),
            target.as_os_str(),
        ];
        let result = run_command(&self.pdftk, args, self.verbose).await?;
        if !result.success() {
            return Err(PackagingError::Command {
                program: self.pdftk.clone(),
                status: result.status.to_string(),
            });
        }

        tokio::fs::rename(&target, &source).await?;
        Ok(())
    }

    /// Zip the rendered file (directory names junked) into `workspace/printmaps.zip`.
    pub async fn archive(&self, workspace: &Path, rendered: &Path, archive_name: &str) -> Result<PathBuf, PackagingError> {
        let archive = workspace.join(archive_name);
        let args: [&OsStr; 3] = [OsStr::new("-j"), archive.as_os_str(), rendered.as_os_str()];
        let result = run_command(&self.zip, args, self.verbose).await?;
        if !result.success() {
            return Err(PackagingError::Command {
                program: self.zip.clone(),
                status: result.status.to_string(),
            });
        }
        Ok(archive)
    }
}

/// Move `archive` to `destination` with a single rename.
pub async fn publish(archive: &Path, destination: &Path) -> Result<(), PackagingError> {
    tokio::fs::rename(archive, destination).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} failed ({status})")]
    Command { program: String, status: String },
}
