//! Grid configuration.
//!
//! One explicit value handed to every grid instance; nothing here is global.

use crate::error::GridResult;
use crate::window::ViewportWindow;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Class-name scheme a renderer should emit. Carried, never interpreted, by
/// the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleScheme {
    /// Utility classes
    #[default]
    Utility,
    /// Prefixed component classes from a generated stylesheet
    Css,
}

/// How rows are windowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    #[default]
    Paged,
    Scrolled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub style: StyleScheme,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub editing: EditingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl GridConfig {
    /// Load from the default location, falling back to defaults.
    pub fn load(app_name: &str) -> Self {
        let Some(path) = Self::config_path(app_name) else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML text.
    pub fn from_toml(content: &str) -> GridResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> GridResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path(app_name: &str) -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", app_name)
            .map(|d| d.config_dir().join("grid.toml"))
    }

    /// Viewport to start from.
    pub fn initial_viewport(&self) -> ViewportWindow {
        match self.window.mode {
            WindowMode::Paged => ViewportWindow::paged(1, self.window.page_size),
            WindowMode::Scrolled => ViewportWindow::from_scroll_offset(
                0,
                self.window.viewport_height,
                self.window.row_height,
                self.window.overscan,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub mode: WindowMode,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_row_height")]
    pub row_height: u32,
    #[serde(default = "default_overscan")]
    pub overscan: usize,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

fn default_page_size() -> usize { 50 }
fn default_row_height() -> u32 { 50 }
fn default_overscan() -> usize { 2 }
fn default_viewport_height() -> u32 { 400 }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            mode: WindowMode::default(),
            page_size: default_page_size(),
            row_height: default_row_height(),
            overscan: default_overscan(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditingConfig {
    #[serde(default = "default_true")]
    pub inline_edit: bool,
}

fn default_true() -> bool { true }

impl Default for EditingConfig {
    fn default() -> Self {
        Self { inline_edit: true }
    }
}

/// Periodic reload of the whole collection from the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

fn default_refresh_interval() -> u64 { 30 }

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_refresh_interval(),
        }
    }
}

impl RefreshConfig {
    /// Reload period, or `None` when periodic reload is off.
    pub fn period(&self) -> Option<Duration> {
        (self.enabled && self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Fields matched by the search box
    #[serde(default)]
    pub searchable_fields: Vec<String>,
    /// Field the date-range filter reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter_field: Option<String>,
}
