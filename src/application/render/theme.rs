//! Built-in themes and brand override resolution.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::application::render::types::RenderError;
use crate::domain::exports::BrandKit;

pub const DEFAULT_THEME_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Accepts `RRGGBB` or the `RGB` shorthand, case-insensitive, with or
    /// without a leading `#`.
    pub fn parse(value: &str) -> Option<Rgb> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).ok();
        match hex.len() {
            6 => Some(Rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let doubled = |idx: usize| channel(&hex[idx..idx + 1]).map(|nibble| nibble * 17);
                Some(Rgb(doubled(0)?, doubled(1)?, doubled(2)?))
            }
            _ => None,
        }
    }

    /// Upper-case `RRGGBB`, the form DrawingML expects.
    pub fn hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Channels scaled to `0.0..=1.0` for PDF colour operators.
    pub fn unit(self) -> [f32; 3] {
        [self.0, self.1, self.2].map(|channel| f32::from(channel) / 255.0)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.hex())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub id: &'static str,
    pub name: &'static str,
    pub heading_font: &'static str,
    pub body_font: &'static str,
    pub background: Rgb,
    pub surface: Rgb,
    pub text: Rgb,
    pub primary: Rgb,
    pub secondary: Rgb,
    pub logo_url: Option<&'static str>,
    pub title_size: f32,
    pub cover_title_size: f32,
    pub body_size: f32,
    pub stat_value_size: f32,
    pub stat_label_size: f32,
    pub stat_sublabel_size: f32,
}

static THEMES: Lazy<BTreeMap<&'static str, Theme>> = Lazy::new(|| {
    let base = Theme {
        id: DEFAULT_THEME_ID,
        name: "Default",
        heading_font: "Calibri",
        body_font: "Calibri",
        background: Rgb(0xFF, 0xFF, 0xFF),
        surface: Rgb(0xF3, 0xF4, 0xF6),
        text: Rgb(0x1F, 0x29, 0x37),
        primary: Rgb(0x25, 0x63, 0xEB),
        secondary: Rgb(0x6B, 0x72, 0x80),
        logo_url: None,
        title_size: 36.0,
        cover_title_size: 48.0,
        body_size: 20.0,
        stat_value_size: 40.0,
        stat_label_size: 16.0,
        stat_sublabel_size: 12.0,
    };
    let midnight = Theme {
        id: "midnight",
        name: "Midnight",
        heading_font: "Segoe UI",
        body_font: "Segoe UI",
        background: Rgb(0x0F, 0x17, 0x2A),
        surface: Rgb(0x1E, 0x29, 0x3B),
        text: Rgb(0xE2, 0xE8, 0xF0),
        primary: Rgb(0x38, 0xBD, 0xF8),
        secondary: Rgb(0x94, 0xA3, 0xB8),
        ..base.clone()
    };
    let paper = Theme {
        id: "paper",
        name: "Paper",
        heading_font: "Georgia",
        body_font: "Georgia",
        background: Rgb(0xFB, 0xF8, 0xF1),
        surface: Rgb(0xEF, 0xE9, 0xDC),
        text: Rgb(0x29, 0x25, 0x24),
        primary: Rgb(0xB4, 0x53, 0x09),
        secondary: Rgb(0x78, 0x71, 0x6C),
        title_size: 34.0,
        cover_title_size: 44.0,
        ..base.clone()
    };

    [base, midnight, paper]
        .into_iter()
        .map(|theme| (theme.id, theme))
        .collect()
});

pub fn find_theme(id: &str) -> Option<&'static Theme> {
    THEMES.get(id)
}

pub fn theme_ids() -> impl Iterator<Item = &'static str> {
    THEMES.keys().copied()
}

/// Looks up `id`, falling back to `fallback` and then to the built-in default.
pub fn theme_or_fallback(id: &str, fallback: &str) -> &'static Theme {
    find_theme(id)
        .or_else(|| find_theme(fallback))
        .unwrap_or_else(|| &THEMES[DEFAULT_THEME_ID])
}

/// Theme with brand overrides applied. Every field falls back to the theme.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub theme: &'static Theme,
    pub primary: Rgb,
    pub secondary: Rgb,
    pub logo_url: Option<String>,
}

impl ResolvedStyle {
    pub fn resolve(theme: &'static Theme, brand: Option<&BrandKit>) -> Result<Self, RenderError> {
        let color = |field: &'static str, value: Option<&String>, default: Rgb| match value {
            Some(raw) => Rgb::parse(raw.trim()).ok_or_else(|| RenderError::InvalidColor {
                field,
                value: raw.clone(),
            }),
            None => Ok(default),
        };

        let primary = color(
            "primaryColor",
            brand.and_then(|kit| kit.primary_color.as_ref()),
            theme.primary,
        )?;
        let secondary = color(
            "secondaryColor",
            brand.and_then(|kit| kit.secondary_color.as_ref()),
            theme.secondary,
        )?;
        let logo_url = brand
            .and_then(|kit| kit.logo_url.clone())
            .or_else(|| theme.logo_url.map(str::to_string));

        Ok(Self {
            theme,
            primary,
            secondary,
            logo_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(Rgb::parse("#1a2B3c"), Some(Rgb(0x1A, 0x2B, 0x3C)));
        assert_eq!(Rgb::parse("#fa0"), Some(Rgb(0xFF, 0xAA, 0x00)));
        assert_eq!(Rgb::parse("1F6FEB"), Some(Rgb(0x1F, 0x6F, 0xEB)));
        assert_eq!(Rgb::parse("fa0"), Some(Rgb(0xFF, 0xAA, 0x00)));
        assert_eq!(Rgb::parse("#12345"), None);
        assert_eq!(Rgb::parse("#ggg"), None);
        assert_eq!(Rgb::parse("##fa0"), None);
        assert_eq!(Rgb::parse(""), None);
        assert_eq!(Rgb(0x0A, 0xB0, 0xFF).hex(), "0AB0FF");
    }

    #[test]
    fn unknown_theme_falls_back() {
        assert_eq!(theme_or_fallback("nope", "midnight").id, "midnight");
        assert_eq!(theme_or_fallback("nope", "also-nope").id, DEFAULT_THEME_ID);
        assert_eq!(theme_or_fallback("paper", "midnight").id, "paper");
        assert!(theme_ids().any(|id| id == DEFAULT_THEME_ID));
    }

    #[test]
    fn brand_overrides_win_per_field() {
        let theme = theme_or_fallback("midnight", DEFAULT_THEME_ID);
        let brand = BrandKit {
            primary_color: Some("#ff0000".into()),
            secondary_color: None,
            logo_url: Some("https://cdn.example/logo.png".into()),
        };

        let style = ResolvedStyle::resolve(theme, Some(&brand)).unwrap();
        assert_eq!(style.primary, Rgb(0xFF, 0, 0));
        assert_eq!(style.secondary, theme.secondary);
        assert_eq!(
            style.logo_url.as_deref(),
            Some("https://cdn.example/logo.png")
        );

        let plain = ResolvedStyle::resolve(theme, None).unwrap();
        assert_eq!(plain.primary, theme.primary);
        assert_eq!(plain.logo_url, None);
    }

    #[test]
    fn brand_colour_without_hash_is_accepted() {
        let theme = theme_or_fallback(DEFAULT_THEME_ID, DEFAULT_THEME_ID);
        let brand = BrandKit {
            primary_color: Some("1F6FEB".into()),
            ..BrandKit::default()
        };
        let style = ResolvedStyle::resolve(theme, Some(&brand)).unwrap();
        assert_eq!(style.primary, Rgb(0x1F, 0x6F, 0xEB));
    }

    #[test]
    fn invalid_brand_colour_is_rejected() {
        let theme = theme_or_fallback(DEFAULT_THEME_ID, DEFAULT_THEME_ID);
        let brand = BrandKit {
            secondary_color: Some("teal".into()),
            ..BrandKit::default()
        };
        let err = ResolvedStyle::resolve(theme, Some(&brand)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidColor {
                field: "secondaryColor",
                ..
            }
        ));
    }
}
