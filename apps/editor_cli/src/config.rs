use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use editor_core::LayoutOptions;
use serde::Deserialize;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "editor.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub service_url: String,
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub column_width: f64,
    pub row_height: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let layout = LayoutOptions::default();
        Self {
            service_url: "http://localhost:5000".into(),
            data_dir: None,
            request_timeout_secs: 600,
            column_width: layout.column_width,
            row_height: layout.row_height,
        }
    }
}

impl Settings {
    pub fn layout(&self) -> LayoutOptions {
        LayoutOptions {
            column_width: self.column_width,
            row_height: self.row_height,
            ..LayoutOptions::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.service_url)
            .with_context(|| format!("invalid model service url '{}'", self.service_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("model service url '{}' must be http or https", self.service_url);
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }
        if self.column_width <= 0.0 || self.row_height <= 0.0 {
            bail!("column width and row height must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    service_url: Option<String>,
    data_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    column_width: Option<f64>,
    row_height: Option<f64>,
}

/// Defaults, then `editor.toml` (or the explicit `--config` file), then the
/// environment.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("failed to parse {DEFAULT_CONFIG_FILE}"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.service_url {
        settings.service_url = v;
    }
    if let Some(v) = file_cfg.data_dir {
        settings.data_dir = Some(v);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.column_width {
        settings.column_width = v;
    }
    if let Some(v) = file_cfg.row_height {
        settings.row_height = v;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = var("MODEL_SERVICE_URL") {
        settings.service_url = v;
    }
    if let Some(v) = var("APP__SERVICE_URL") {
        settings.service_url = v;
    }

    if let Some(v) = var("APP__DATA_DIR") {
        settings.data_dir = Some(PathBuf::from(v));
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v
            .parse()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?;
    }
    if let Some(v) = var("APP__COLUMN_WIDTH") {
        settings.column_width = v
            .parse()
            .with_context(|| format!("APP__COLUMN_WIDTH is not a number: '{v}'"))?;
    }
    if let Some(v) = var("APP__ROW_HEIGHT") {
        settings.row_height = v
            .parse()
            .with_context(|| format!("APP__ROW_HEIGHT is not a number: '{v}'"))?;
    }
    Ok(())
}
