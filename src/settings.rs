use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::components::tools::ToolSettings;
use crate::stroke::BrushParams;
use crate::{log_info, log_warn};

const SETTINGS_FILE: &str = "paintcore_settings.cfg";

/// Editor-wide preferences persisted as a plain `key = value` file.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub max_undo_steps: usize,
    /// 0 disables the memory cap.
    pub history_memory_mb: usize,
    pub grid_spacing: u32,
    pub show_grid: bool,
    pub ants_interval_ms: u64,

    // Tool defaults
    pub brush_size: f32,
    pub brush_opacity: f32,
    pub brush_hardness: f32,
    pub brush_spacing: f32,
    pub tolerance: i32,
    pub contiguous: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 30,
            history_memory_mb: 256,
            grid_spacing: 32,
            show_grid: false,
            ants_interval_ms: 80,
            brush_size: 20.0,
            brush_opacity: 100.0,
            brush_hardness: 80.0,
            brush_spacing: 0.2,
            tolerance: 32,
            contiguous: true,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux/macOS: $XDG_CONFIG_HOME/paintcore/paintcore_settings.cfg (default ~/.config)
    /// On Windows:     %APPDATA%\PaintCore\paintcore_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("PaintCore").join(SETTINGS_FILE));
        }
        #[cfg(not(target_os = "windows"))]
        {
            let config_dir = match std::env::var("XDG_CONFIG_HOME") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
            };
            Some(config_dir.join("paintcore").join(SETTINGS_FILE))
        }
    }

    /// Load settings from the default location (defaults if missing).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`.  A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                log_info!("settings: loaded {}", path.display());
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    /// Parse `key = value` lines.  Unknown keys are ignored and bad values
    /// keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => s.max_undo_steps = val.parse().unwrap_or(d.max_undo_steps).max(1),
                "history_memory_mb" => s.history_memory_mb = val.parse().unwrap_or(d.history_memory_mb),
                "grid_spacing" => s.grid_spacing = val.parse().unwrap_or(d.grid_spacing).max(1),
                "show_grid" => s.show_grid = val == "true",
                "ants_interval_ms" => s.ants_interval_ms = val.parse().unwrap_or(d.ants_interval_ms).max(1),
                "brush_size" => s.brush_size = val.parse().unwrap_or(d.brush_size).max(1.0),
                "brush_opacity" => s.brush_opacity = val.parse().unwrap_or(d.brush_opacity).clamp(0.0, 100.0),
                "brush_hardness" => s.brush_hardness = val.parse().unwrap_or(d.brush_hardness).clamp(0.0, 100.0),
                "brush_spacing" => s.brush_spacing = val.parse().unwrap_or(d.brush_spacing).max(0.01),
                "tolerance" => s.tolerance = val.parse().unwrap_or(d.tolerance).clamp(0, 255),
                "contiguous" => s.contiguous = val != "false",
                _ => {}
            }
        }
        s
    }

    pub fn to_cfg_string(&self) -> String {
        format!(
            "max_undo_steps = {}\n\
             history_memory_mb = {}\n\
             grid_spacing = {}\n\
             show_grid = {}\n\
             ants_interval_ms = {}\n\
             brush_size = {}\n\
             brush_opacity = {}\n\
             brush_hardness = {}\n\
             brush_spacing = {}\n\
             tolerance = {}\n\
             contiguous = {}\n",
            self.max_undo_steps,
            self.history_memory_mb,
            self.grid_spacing,
            self.show_grid,
            self.ants_interval_ms,
            self.brush_size,
            self.brush_opacity,
            self.brush_hardness,
            self.brush_spacing,
            self.tolerance,
            self.contiguous,
        )
    }

    /// Save to the default location.  Failures are logged, not returned.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("settings: could not write {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_cfg_string())
    }

    /// History memory cap in bytes, `None` when disabled.
    pub fn history_memory_bytes(&self) -> Option<usize> {
        (self.history_memory_mb > 0).then(|| self.history_memory_mb * 1024 * 1024)
    }

    pub fn ants_interval(&self) -> Duration {
        Duration::from_millis(self.ants_interval_ms.max(1))
    }

    /// Tool defaults derived from these settings.
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            brush: BrushParams {
                size: self.brush_size,
                opacity: self.brush_opacity,
                hardness: self.brush_hardness,
                spacing: self.brush_spacing,
                ..BrushParams::default()
            },
            tolerance: self.tolerance,
            contiguous: self.contiguous,
            ..ToolSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_unknown_and_bad_values() {
        let s = EditorSettings::parse(
            "# comment\nmax_undo_steps = 12\nbogus = 4\ngrid_spacing = nope\ntolerance=900\nshow_grid=true\n",
        );
        assert_eq!(s.max_undo_steps, 12);
        assert_eq!(s.grid_spacing, 32);
        assert_eq!(s.tolerance, 255);
        assert!(s.show_grid);
    }

    #[test]
    fn cfg_string_parses_back() {
        let s = EditorSettings { brush_size: 7.5, contiguous: false, history_memory_mb: 0, ..Default::default() };
        let back = EditorSettings::parse(&s.to_cfg_string());
        assert_eq!(back, s);
        assert_eq!(back.history_memory_bytes(), None);
    }

    #[test]
    fn tool_settings_carry_brush_defaults() {
        let t = EditorSettings { brush_hardness: 40.0, tolerance: 10, ..Default::default() }.tool_settings();
        assert_eq!(t.brush.hardness, 40.0);
        assert_eq!(t.tolerance, 10);
        assert_eq!(t.brush.flow, 1.0);
    }
}
