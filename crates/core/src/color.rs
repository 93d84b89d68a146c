//! Color tokens, luminance and the arrow contrast rule.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum WCAG contrast ratio for white arrows drawn on a track color.
pub const ARROW_CONTRAST_THRESHOLD: f64 = 3.0;

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    /// Dark arrow used when white lacks contrast.
    pub const ARROW_DARK: Rgb = Rgb::new(0x22, 0x22, 0x22);
    /// Track color for suspended or inactive segments.
    pub const INACTIVE: Rgb = Rgb::new(0xb4, 0xb4, 0xb4);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// WCAG 2.x relative luminance.
    pub fn relative_luminance(self) -> f64 {
        fn channel(value: u8) -> f64 {
            let c = f64::from(value) / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * channel(self.r) + 0.7152 * channel(self.g) + 0.0722 * channel(self.b)
    }

    /// Contrast ratio in `[1, 21]`.
    pub fn contrast_ratio(self, other: Rgb) -> f64 {
        let a = self.relative_luminance();
        let b = other.relative_luminance();
        let (light, dark) = if a >= b { (a, b) } else { (b, a) };
        (light + 0.05) / (dark + 0.05)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Arrow color for a given track color: white whenever it reaches the
/// contrast threshold, a dark arrow otherwise (yellow-ish tracks).
pub fn arrow_color(track: Rgb) -> Rgb {
    if track.contrast_ratio(Rgb::WHITE) >= ARROW_CONTRAST_THRESHOLD {
        Rgb::WHITE
    } else {
        Rgb::ARROW_DARK
    }
}

static RGB_FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*(?:\d*\.?\d+%?)\s*)?\)$",
    )
    .expect("invalid rgb() regex")
});

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0x00, 0x00, 0x00)),
    ("white", Rgb::new(0xff, 0xff, 0xff)),
    ("red", Rgb::new(0xff, 0x00, 0x00)),
    ("green", Rgb::new(0x00, 0x80, 0x00)),
    ("lime", Rgb::new(0x00, 0xff, 0x00)),
    ("blue", Rgb::new(0x00, 0x00, 0xff)),
    ("yellow", Rgb::new(0xff, 0xff, 0x00)),
    ("orange", Rgb::new(0xff, 0xa5, 0x00)),
    ("purple", Rgb::new(0x80, 0x00, 0x80)),
    ("pink", Rgb::new(0xff, 0xc0, 0xcb)),
    ("brown", Rgb::new(0xa5, 0x2a, 0x2a)),
    ("gray", Rgb::new(0x80, 0x80, 0x80)),
    ("grey", Rgb::new(0x80, 0x80, 0x80)),
    ("silver", Rgb::new(0xc0, 0xc0, 0xc0)),
    ("gold", Rgb::new(0xff, 0xd7, 0x00)),
    ("cyan", Rgb::new(0x00, 0xff, 0xff)),
    ("aqua", Rgb::new(0x00, 0xff, 0xff)),
    ("magenta", Rgb::new(0xff, 0x00, 0xff)),
    ("navy", Rgb::new(0x00, 0x00, 0x80)),
    ("teal", Rgb::new(0x00, 0x80, 0x80)),
    ("maroon", Rgb::new(0x80, 0x00, 0x00)),
    ("olive", Rgb::new(0x80, 0x80, 0x00)),
    ("crimson", Rgb::new(0xdc, 0x14, 0x3c)),
    ("skyblue", Rgb::new(0x87, 0xce, 0xeb)),
];

/// Parse a color token: a named color, `#rgb`/`#rrggbb`/`#rrggbbaa`, or `rgb()`/`rgba()`.
pub fn parse_color(input: &str) -> Option<Rgb> {
    let token = input.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(hex) = token.strip_prefix('#') {
        return parse_hex(hex);
    }

    let lowered = token.to_ascii_lowercase();
    if let Some(caps) = RGB_FUNCTION_RE.captures(&lowered) {
        let mut channels = [0u8; 3];
        for (slot, index) in channels.iter_mut().zip(1..=3) {
            let value: u16 = caps.get(index)?.as_str().parse().ok()?;
            *slot = u8::try_from(value).ok()?;
        }
        return Some(Rgb::new(channels[0], channels[1], channels[2]));
    }

    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, rgb)| *rgb)
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some(Rgb::new(r, g, b))
        }
        6 | 8 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Rgb::new(r, g, b))
        }
        _ => None,
    }
}
