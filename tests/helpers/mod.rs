//! Test helper utilities: throwaway working directories and fake tool scripts
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use printmaps_buildservice::app_state::AppState;
use printmaps_buildservice::config::{AppConfig, MapStyle};

use crate::fixtures::{BASE_STYLE_XML, PDFTK_OK, RENDERER_OK, STYLE_NAME, ZIP_OK};

/// A complete service layout below a temporary directory.
pub struct TestEnv {
    pub root: TempDir,
    pub config: AppConfig,
}

impl TestEnv {
    /// Working tools (renderer, zip, pdftk) and one registered style.
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let workdir = root.path().join("work");
        let markers_dir = root.path().join("markers");
        let styles_dir = root.path().join("styles");
        let bin_dir = root.path().join("bin");
        for dir in [&workdir, &markers_dir, &styles_dir, &bin_dir] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::create_dir_all(workdir.join("maps")).unwrap();
        std::fs::create_dir_all(workdir.join("orders")).unwrap();
        std::fs::write(styles_dir.join("osm.xml"), BASE_STYLE_XML).unwrap();

        let config = AppConfig {
            workdir,
            max_procs: 2,
            grace_period_secs: 1,
            poll_interval_secs: 1,
            claim_retry_delay_ms: 10,
            renderer_command: write_script(&bin_dir, "renderer", RENDERER_OK),
            markers_dir,
            styles_file: root.path().join("styles.json"),
            pdftk_command: write_script(&bin_dir, "pdftk", PDFTK_OK),
            zip_command: write_script(&bin_dir, "zip", ZIP_OK),
            test_mode: false,
            build_metrics: true,
            metrics_addr: None,
            log_file: None,
            styles: vec![MapStyle {
                name: STYLE_NAME.to_string(),
                xml_path: styles_dir,
                xml_file: "osm.xml".to_string(),
            }],
        };

        Self { root, config }
    }

    /// Replace the renderer by a script with the given body.
    pub fn with_renderer(mut self, body: &str) -> Self {
        self.config.renderer_command = write_script(&self.bin_dir(), "renderer-custom", body);
        self
    }

    pub fn with_zip(mut self, body: &str) -> Self {
        self.config.zip_command = write_script(&self.bin_dir(), "zip-custom", body);
        self
    }

    pub fn with_pdftk(mut self, body: &str) -> Self {
        self.config.pdftk_command = write_script(&self.bin_dir(), "pdftk-custom", body);
        self
    }

    /// Run `hook` (shell) before every renderer invocation, then the current renderer.
    pub fn with_renderer_hook(mut self, hook: &str) -> Self {
        let body = format!("#!/bin/sh\n{hook}\nexec {} \"$@\"\n", self.config.renderer_command);
        self.config.renderer_command = write_script(&self.bin_dir(), "renderer-hooked", &body);
        self
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.config.clone())
    }

    pub fn orders_dir(&self) -> PathBuf {
        self.config.orders_dir()
    }

    pub fn styles_dir(&self) -> PathBuf {
        self.config.styles[0].xml_path.clone()
    }

    fn bin_dir(&self) -> PathBuf {
        self.root.path().join("bin")
    }
}

/// Write an executable shell script and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Drop an order file with an explicit modification time into the queue.
pub fn write_order_file(orders_dir: &Path, name: &str, age: Duration) {
    let path = orders_dir.join(name);
    std::fs::write(&path, b"{}").unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}
