use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scroll tuning. Widths share the unit of the caller's measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarqueeConfig {
    /// Units per second.
    pub speed: f64,
    /// Added to the text width before computing the duration.
    pub pad: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    /// Placed between the two copies of looping text.
    pub separator: String,
    /// Labels longer than this many characters scroll regardless of width.
    pub char_threshold: usize,
}

impl MarqueeConfig {
    /// Separator width in layout units when each character spans `cell_width`.
    pub fn separator_width(&self, cell_width: f64) -> f64 {
        self.separator.chars().count() as f64 * cell_width
    }
}

impl Default for MarqueeConfig {
    fn default() -> Self {
        Self {
            speed: 40.0,
            pad: 48.0,
            min_secs: 4.0,
            max_secs: 30.0,
            separator: "    ".to_string(),
            char_threshold: 12,
        }
    }
}

/// Whether text fits its container or has to loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Marquee {
    Static,
    Scroll {
        duration_secs: f64,
        /// Distance travelled in one loop: text plus separator.
        cycle_width: f64,
    },
}

impl Marquee {
    /// `separator_width` shares the unit of `text_width`.
    pub fn decide(
        text_width: f64,
        container_width: f64,
        separator_width: f64,
        config: &MarqueeConfig,
    ) -> Self {
        if text_width <= container_width {
            return Marquee::Static;
        }
        let speed = if config.speed > 0.0 { config.speed } else { 1.0 };
        let min = config.min_secs.min(config.max_secs);
        let duration_secs = ((text_width + config.pad) / speed).clamp(min, config.max_secs);
        Marquee::Scroll {
            duration_secs,
            cycle_width: text_width + separator_width.max(0.0),
        }
    }

    /// Character-count variant for labels laid out without measurement.
    pub fn decide_by_chars(text: &str, config: &MarqueeConfig) -> Self {
        let chars = text.chars().count();
        Self::decide(
            chars as f64,
            config.char_threshold as f64,
            config.separator_width(1.0),
            config,
        )
    }

    pub fn is_scrolling(&self) -> bool {
        matches!(self, Marquee::Scroll { .. })
    }

    /// Scroll offset after `elapsed`, in `[0, cycle_width)`.
    pub fn offset_at(&self, elapsed: Duration) -> f64 {
        match *self {
            Marquee::Static => 0.0,
            Marquee::Scroll {
                duration_secs,
                cycle_width,
            } => {
                if duration_secs <= 0.0 || cycle_width <= 0.0 {
                    return 0.0;
                }
                let phase = (elapsed.as_secs_f64() / duration_secs).fract();
                phase * cycle_width
            }
        }
    }
}

/// `width` characters of `text` looped with `separator`, starting `offset`
/// characters in.
pub fn frame(text: &str, separator: &str, width: usize, offset: usize) -> String {
    let cycle: Vec<char> = text.chars().chain(separator.chars()).collect();
    if cycle.is_empty() {
        return String::new();
    }
    cycle
        .iter()
        .cycle()
        .skip(offset % cycle.len())
        .take(width)
        .collect()
}
