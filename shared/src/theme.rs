//! Color scheme resolution and design tokens.
//!
//! The core keeps a [`ThemePreference`] in its model and persists the mode
//! through the key-value capability. [`ThemeContext`] is the Rust-host mirror:
//! created once with [`ThemeContext::init`], handed around as an `Arc`, and
//! kept current by the host as mode writes pass through it. Only the
//! [`ThemeMode`] is ever persisted.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{KvOperation, KvOutput, SessionStore, StoreKey};
use crate::AppResult;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub const ALL: [ThemeMode; 3] = [ThemeMode::Light, ThemeMode::Dark, ThemeMode::System];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    /// Unknown strings read as [`ThemeMode::System`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "light" => Self::Light,
            "dark" => Self::Dark,
            _ => Self::System,
        }
    }

    /// The mode a previous run stored, or the default when none was.
    pub fn stored(output: &KvOutput) -> Self {
        output
            .get(StoreKey::ThemeMode)
            .map(Self::parse)
            .unwrap_or_default()
    }

    pub fn persist(self) -> KvOperation {
        KvOperation::Write {
            entries: vec![(StoreKey::ThemeMode, self.as_str().to_string())],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

/// `0xRRGGBB`, serialized as `"#RRGGBB"` for the shells.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0 & 0x00FF_FFFF)
    }
}

impl fmt::Debug for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let hex = raw.strip_prefix('#').unwrap_or(&raw);
        u32::from_str_radix(hex, 16)
            .ok()
            .filter(|_| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .map(Rgb)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color '{raw}'")))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub primary: Rgb,
    pub accent: Rgb,
    pub brand: Rgb,
    pub background: Rgb,
    pub surface: Rgb,
    pub text_primary: Rgb,
    pub text_secondary: Rgb,
    pub text_on_primary: Rgb,
    pub success: Rgb,
    pub warning: Rgb,
    pub error: Rgb,
    pub info: Rgb,
    pub border: Rgb,
    pub disabled: Rgb,
}

impl Palette {
    pub const LIGHT: Palette = Palette {
        primary: Rgb(0x7FC6A4),
        accent: Rgb(0xF28C4D),
        brand: Rgb(0x4B2D6B),
        background: Rgb(0xF5F5F5),
        surface: Rgb(0xFFFFFF),
        text_primary: Rgb(0x2E2E2E),
        text_secondary: Rgb(0x6B6B6B),
        text_on_primary: Rgb(0xFFFFFF),
        success: Rgb(0x7FC6A4),
        warning: Rgb(0xFFC857),
        error: Rgb(0xE5543D),
        info: Rgb(0x6EC6FF),
        border: Rgb(0xE3E3E3),
        disabled: Rgb(0xCFCFCF),
    };

    // Brand hues kept, neutrals inverted.
    pub const DARK: Palette = Palette {
        primary: Rgb(0x7FC6A4),
        accent: Rgb(0xF28C4D),
        brand: Rgb(0x9B7BC0),
        background: Rgb(0x121212),
        surface: Rgb(0x1E1E1E),
        text_primary: Rgb(0xF2F2F2),
        text_secondary: Rgb(0xA8A8A8),
        text_on_primary: Rgb(0x121212),
        success: Rgb(0x7FC6A4),
        warning: Rgb(0xFFD27F),
        error: Rgb(0xFF6F5B),
        info: Rgb(0x8FD3FF),
        border: Rgb(0x333333),
        disabled: Rgb(0x4A4A4A),
    };

    pub const fn for_scheme(scheme: ColorScheme) -> Self {
        match scheme {
            ColorScheme::Light => Self::LIGHT,
            ColorScheme::Dark => Self::DARK,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spacing {
    pub xs: u16,
    pub sm: u16,
    pub md: u16,
    pub lg: u16,
    pub xl: u16,
    pub xxl: u16,
}

impl Spacing {
    pub const DEFAULT: Spacing = Spacing {
        xs: 4,
        sm: 8,
        md: 16,
        lg: 24,
        xl: 32,
        xxl: 48,
    };
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Radii {
    pub sm: u16,
    pub md: u16,
    pub lg: u16,
    pub xl: u16,
    pub round: u16,
}

impl Radii {
    pub const DEFAULT: Radii = Radii {
        sm: 8,
        md: 12,
        lg: 16,
        xl: 24,
        round: 999,
    };
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontSizes {
    pub xs: u16,
    pub sm: u16,
    pub base: u16,
    pub lg: u16,
    pub xl: u16,
    pub xxl: u16,
    pub xxxl: u16,
    pub huge: u16,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontWeights {
    pub regular: u16,
    pub medium: u16,
    pub semibold: u16,
    pub bold: u16,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LineHeights {
    pub tight: f32,
    pub normal: f32,
    pub relaxed: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size: u16,
    pub font_weight: u16,
    pub line_height: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStyles {
    pub h1: TextStyle,
    pub h2: TextStyle,
    pub h3: TextStyle,
    pub section_title: TextStyle,
    pub body: TextStyle,
    pub body_bold: TextStyle,
    pub caption: TextStyle,
    pub caption_bold: TextStyle,
    pub label: TextStyle,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Typography {
    pub sizes: FontSizes,
    pub weights: FontWeights,
    pub line_heights: LineHeights,
    pub styles: TextStyles,
}

impl Typography {
    pub const SIZES: FontSizes = FontSizes {
        xs: 12,
        sm: 14,
        base: 16,
        lg: 18,
        xl: 20,
        xxl: 24,
        xxxl: 28,
        huge: 32,
    };

    pub const WEIGHTS: FontWeights = FontWeights {
        regular: 400,
        medium: 500,
        semibold: 600,
        bold: 700,
    };

    pub const LINE_HEIGHTS: LineHeights = LineHeights {
        tight: 1.2,
        normal: 1.5,
        relaxed: 1.75,
    };

    const fn style(font_size: u16, font_weight: u16, line_height: f32) -> TextStyle {
        TextStyle {
            font_size,
            font_weight,
            line_height,
        }
    }

    pub const DEFAULT: Typography = {
        let s = Self::SIZES;
        let w = Self::WEIGHTS;
        let l = Self::LINE_HEIGHTS;
        Typography {
            sizes: s,
            weights: w,
            line_heights: l,
            styles: TextStyles {
                h1: Self::style(s.huge, w.bold, l.tight),
                h2: Self::style(s.xxxl, w.bold, l.tight),
                h3: Self::style(s.xxl, w.semibold, l.tight),
                section_title: Self::style(s.lg, w.semibold, l.normal),
                body: Self::style(s.base, w.regular, l.normal),
                body_bold: Self::style(s.base, w.medium, l.normal),
                caption: Self::style(s.sm, w.regular, l.normal),
                caption_bold: Self::style(s.sm, w.medium, l.normal),
                label: Self::style(s.xs, w.medium, l.normal),
            },
        }
    };
}

/// Everything a screen needs to draw itself for one scheme.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ThemeTokens {
    pub scheme: ColorScheme,
    pub colors: Palette,
    pub spacing: Spacing,
    pub radii: Radii,
    pub typography: Typography,
}

impl ThemeTokens {
    pub const fn for_scheme(scheme: ColorScheme) -> Self {
        Self {
            scheme,
            colors: Palette::for_scheme(scheme),
            spacing: Spacing::DEFAULT,
            radii: Radii::DEFAULT,
            typography: Typography::DEFAULT,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ThemePreference {
    pub mode: ThemeMode,
    pub platform: Option<ColorScheme>,
}

impl ThemePreference {
    /// `system` follows the platform; a platform that reports nothing reads as light.
    pub fn effective(&self) -> ColorScheme {
        match self.mode {
            ThemeMode::Light => ColorScheme::Light,
            ThemeMode::Dark => ColorScheme::Dark,
            ThemeMode::System => self.platform.unwrap_or(ColorScheme::Light),
        }
    }

    pub fn tokens(&self) -> ThemeTokens {
        ThemeTokens::for_scheme(self.effective())
    }
}

/// Process-wide theme state for Rust-side consumers of the session store.
pub struct ThemeContext<S: SessionStore> {
    store: Arc<S>,
    tx: watch::Sender<ThemePreference>,
}

impl<S: SessionStore> ThemeContext<S> {
    /// Reads the persisted mode. A read failure is logged and falls back to `system`.
    #[instrument(skip(store))]
    pub async fn init(store: Arc<S>, platform: Option<ColorScheme>) -> Self {
        let mode = match store.get(StoreKey::ThemeMode).await {
            Ok(Some(raw)) => ThemeMode::parse(&raw),
            Ok(None) => ThemeMode::default(),
            Err(e) => {
                warn!(error = %e, "could not read persisted theme mode");
                ThemeMode::default()
            }
        };
        info!(mode = mode.as_str(), "theme initialized");

        let (tx, _rx) = watch::channel(ThemePreference { mode, platform });
        Self { store, tx }
    }

    pub fn preference(&self) -> ThemePreference {
        *self.tx.borrow()
    }

    pub fn mode(&self) -> ThemeMode {
        self.preference().mode
    }

    pub fn resolve(&self) -> ThemeTokens {
        self.preference().tokens()
    }

    /// Persists `mode` first; subscribers only see it once it is stored.
    #[instrument(skip(self), fields(mode = mode.as_str()))]
    pub async fn set_mode(&self, mode: ThemeMode) -> AppResult<()> {
        self.store.set(StoreKey::ThemeMode, mode.as_str()).await?;
        self.tx.send_modify(|pref| pref.mode = mode);
        debug!("theme mode stored");
        Ok(())
    }

    /// Follows a mode the core already wrote to the store.
    pub fn observe_stored(&self, raw: &str) {
        let mode = ThemeMode::parse(raw);
        let changed = self.tx.send_if_modified(|pref| {
            let changed = pref.mode != mode;
            pref.mode = mode;
            changed
        });
        if changed {
            debug!(mode = mode.as_str(), "theme mode followed store write");
        }
    }

    pub fn set_platform_scheme(&self, scheme: Option<ColorScheme>) {
        self.tx.send_if_modified(|pref| {
            let changed = pref.platform != scheme;
            pref.platform = scheme;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ThemePreference> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryStore;

    #[test]
    fn test_mode_parse_falls_back_to_system() {
        assert_eq!(ThemeMode::parse("dark"), ThemeMode::Dark);
        assert_eq!(ThemeMode::parse("light"), ThemeMode::Light);
        assert_eq!(ThemeMode::parse("sepia"), ThemeMode::System);
        assert_eq!(ThemeMode::parse(""), ThemeMode::System);
    }

    #[test]
    fn test_system_follows_platform() {
        let mut pref = ThemePreference::default();
        assert_eq!(pref.effective(), ColorScheme::Light);

        pref.platform = Some(ColorScheme::Dark);
        assert_eq!(pref.tokens().colors, Palette::DARK);

        pref.platform = Some(ColorScheme::Light);
        assert_eq!(pref.tokens().colors, Palette::LIGHT);
        assert_eq!(pref.mode, ThemeMode::System);
    }

    #[test]
    fn test_explicit_mode_ignores_platform() {
        for platform in [None, Some(ColorScheme::Light), Some(ColorScheme::Dark)] {
            let dark = ThemePreference {
                mode: ThemeMode::Dark,
                platform,
            };
            assert_eq!(dark.effective(), ColorScheme::Dark);
        }
    }

    #[test]
    fn test_colors_serialize_as_hex() {
        let json = serde_json::to_value(Palette::LIGHT).unwrap();
        assert_eq!(json["primary"], "#7FC6A4");
        assert_eq!(json["textOnPrimary"], "#FFFFFF");
        let back: Rgb = serde_json::from_str("\"#4B2D6B\"").unwrap();
        assert_eq!(back, Rgb(0x4B2D6B));
        assert!(serde_json::from_str::<Rgb>("\"#12\"").is_err());
    }

    #[test]
    fn test_typography_presets() {
        let t = Typography::DEFAULT;
        assert_eq!(t.styles.h1.font_size, 32);
        assert_eq!(t.styles.body.font_weight, 400);
        assert_eq!(t.styles.label.font_size, 12);
    }

    #[tokio::test]
    async fn test_context_persists_only_the_mode() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ThemeContext::init(store.clone(), Some(ColorScheme::Dark)).await;
        assert_eq!(ctx.mode(), ThemeMode::System);

        ctx.set_mode(ThemeMode::Light).await.unwrap();
        assert_eq!(
            store.get(StoreKey::ThemeMode).await.unwrap().as_deref(),
            Some("light")
        );
        for key in [StoreKey::AuthToken, StoreKey::CachedUser, StoreKey::RememberedIdentity] {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_context_follows_observed_writes() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ThemeContext::init(store, None).await;
        let mut rx = ctx.subscribe();

        ctx.observe_stored("dark");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().mode, ThemeMode::Dark);

        ctx.observe_stored("dark");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_stored_mode_reads_from_output() {
        let out = KvOutput {
            values: vec![(StoreKey::ThemeMode, "light".into())],
        };
        assert_eq!(ThemeMode::stored(&out), ThemeMode::Light);
        assert_eq!(ThemeMode::stored(&KvOutput::default()), ThemeMode::System);
        assert_eq!(
            ThemeMode::Dark.persist().keys(),
            vec![StoreKey::ThemeMode]
        );
    }
}
