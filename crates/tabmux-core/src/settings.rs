//! User settings: the read model surfaces render with, and the store that
//! publishes changes to it.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::SettingsError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    #[serde(rename = "Cyber Grape")]
    CyberGrape,
    #[serde(rename = "Midnight Neon")]
    MidnightNeon,
    #[serde(rename = "Minimal Pro")]
    MinimalPro,
    #[serde(rename = "Sunset Vapor")]
    SunsetVapor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Bash,
    #[default]
    Zsh,
    Fish,
    Powershell,
    Cmd,
}

impl Shell {
    /// Program name to launch for this shell.
    pub fn program(&self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
            Shell::Powershell => "powershell.exe",
            Shell::Cmd => "cmd.exe",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorStyle {
    Block,
    Underline,
    #[default]
    Bar,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    // Appearance
    pub theme: Theme,
    pub font_size: u16,
    pub line_height: f32,
    pub font_family: String,
    pub opacity: f32,

    // Terminal
    pub cursor_blink: bool,
    pub cursor_style: CursorStyle,
    pub default_shell: Shell,
    pub close_on_exit: bool,
    pub confirm_close: bool,
    pub auto_save_history: bool,
    pub clear_on_new_tab: bool,
    pub show_timestamps: bool,

    // Advanced
    pub history_limit: usize,
    pub scrollback_buffer: usize,
    pub enable_ligatures: bool,
    pub gpu_acceleration: bool,
    pub sound_effects: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::CyberGrape,
            font_size: 14,
            line_height: 1.5,
            font_family: "JetBrains Mono".to_string(),
            opacity: 0.95,

            cursor_blink: true,
            cursor_style: CursorStyle::Bar,
            default_shell: Shell::Zsh,
            close_on_exit: false,
            confirm_close: true,
            auto_save_history: true,
            clear_on_new_tab: false,
            show_timestamps: true,

            history_limit: 1000,
            scrollback_buffer: 10000,
            enable_ligatures: true,
            gpu_acceleration: true,
            sound_effects: false,
        }
    }
}

/// A partial settings update. Unset fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsDelta {
    pub theme: Option<Theme>,
    pub font_size: Option<u16>,
    pub line_height: Option<f32>,
    pub font_family: Option<String>,
    pub opacity: Option<f32>,
    pub cursor_blink: Option<bool>,
    pub cursor_style: Option<CursorStyle>,
    pub default_shell: Option<Shell>,
    pub close_on_exit: Option<bool>,
    pub confirm_close: Option<bool>,
    pub auto_save_history: Option<bool>,
    pub clear_on_new_tab: Option<bool>,
    pub show_timestamps: Option<bool>,
    pub history_limit: Option<usize>,
    pub scrollback_buffer: Option<usize>,
    pub enable_ligatures: Option<bool>,
    pub gpu_acceleration: Option<bool>,
    pub sound_effects: Option<bool>,
}

/// What applying a [`SettingsDelta`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeltaEffect {
    /// Some field took a new value.
    pub changed: bool,
    /// A field that affects cell size changed; grids must be re-fitted.
    pub refit: bool,
}

fn merge<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) if *slot != value => {
            *slot = value;
            true
        }
        _ => false,
    }
}

impl Settings {
    /// Merge `delta` into these settings.
    pub fn apply(&mut self, delta: SettingsDelta) -> DeltaEffect {
        let refit = [
            merge(&mut self.font_size, delta.font_size),
            merge(&mut self.line_height, delta.line_height),
            merge(&mut self.font_family, delta.font_family),
        ]
        .contains(&true);

        let other = [
            merge(&mut self.theme, delta.theme),
            merge(&mut self.opacity, delta.opacity),
            merge(&mut self.cursor_blink, delta.cursor_blink),
            merge(&mut self.cursor_style, delta.cursor_style),
            merge(&mut self.default_shell, delta.default_shell),
            merge(&mut self.close_on_exit, delta.close_on_exit),
            merge(&mut self.confirm_close, delta.confirm_close),
            merge(&mut self.auto_save_history, delta.auto_save_history),
            merge(&mut self.clear_on_new_tab, delta.clear_on_new_tab),
            merge(&mut self.show_timestamps, delta.show_timestamps),
            merge(&mut self.history_limit, delta.history_limit),
            merge(&mut self.scrollback_buffer, delta.scrollback_buffer),
            merge(&mut self.enable_ligatures, delta.enable_ligatures),
            merge(&mut self.gpu_acceleration, delta.gpu_acceleration),
            merge(&mut self.sound_effects, delta.sound_effects),
        ]
        .contains(&true);

        DeltaEffect {
            changed: refit || other,
            refit,
        }
    }
}

/// Holds the current settings and notifies subscribers of changes.
///
/// Persistence belongs to whoever embeds the store: load with
/// [`SettingsStore::import_json`], save the output of
/// [`SettingsStore::export_json`].
pub struct SettingsStore {
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self { tx }
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Merge a delta. Subscribers are only woken if something changed.
    pub fn update(&self, delta: SettingsDelta) -> DeltaEffect {
        let mut effect = DeltaEffect::default();
        self.tx.send_if_modified(|settings| {
            effect = settings.apply(delta);
            effect.changed
        });
        effect
    }

    pub fn replace(&self, settings: Settings) {
        self.tx.send_replace(settings);
    }

    pub fn reset(&self) {
        self.replace(Settings::default());
    }

    pub fn export_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(&*self.tx.borrow())?)
    }

    /// Merge settings from JSON over the current values.
    ///
    /// Fields missing from `json` keep their value; unknown fields are ignored.
    pub fn import_json(&self, json: &str) -> Result<DeltaEffect, SettingsError> {
        let delta: SettingsDelta = serde_json::from_str(json)?;
        Ok(self.update(delta))
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
