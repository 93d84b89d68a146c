//! Display class detection and the visible-station-count table.

use serde::{Deserialize, Serialize};

/// Scale percentages with a dedicated column in [`VISIBLE_COUNTS`].
const SCALE_BUCKETS: [u32; 6] = [100, 125, 150, 175, 200, 250];

/// Visible stations per display class (rows: HD, QHD, UHD) and scale bucket.
/// Counts shrink as the scale grows and on 4K panels, which are viewed at
/// larger type.
const VISIBLE_COUNTS: [[usize; 6]; 3] = [
    [20, 16, 13, 11, 10, 8],
    [24, 20, 16, 14, 12, 10],
    [18, 15, 12, 10, 9, 7],
];

/// Coarse physical-resolution bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayClass {
    /// Up to 1920x1200 physical pixels.
    Hd,
    /// Up to 2880 physical pixels on the long side.
    Qhd,
    /// 4K and beyond.
    Uhd,
}

impl DisplayClass {
    pub fn from_physical(width: u32, height: u32) -> Self {
        let long_side = width.max(height);
        if long_side <= 1920 {
            DisplayClass::Hd
        } else if long_side <= 2880 {
            DisplayClass::Qhd
        } else {
            DisplayClass::Uhd
        }
    }

    fn row(self) -> usize {
        match self {
            DisplayClass::Hd => 0,
            DisplayClass::Qhd => 1,
            DisplayClass::Uhd => 2,
        }
    }
}

/// Resolution and scale as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayProfile {
    /// Logical (CSS) width.
    pub width: u32,
    /// Logical (CSS) height.
    pub height: u32,
    pub device_pixel_ratio: f64,
}

impl DisplayProfile {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        let device_pixel_ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            width,
            height,
            device_pixel_ratio,
        }
    }

    pub fn scale_percent(&self) -> u32 {
        (self.device_pixel_ratio * 100.0).round() as u32
    }

    pub fn physical(&self) -> (u32, u32) {
        (
            (f64::from(self.width) * self.device_pixel_ratio).round() as u32,
            (f64::from(self.height) * self.device_pixel_ratio).round() as u32,
        )
    }

    pub fn class(&self) -> DisplayClass {
        let (width, height) = self.physical();
        DisplayClass::from_physical(width, height)
    }

    /// Number of stations the linear map shows before it starts scrolling.
    pub fn visible_count(&self) -> usize {
        visible_count(self.class(), self.scale_percent())
    }
}

/// Table lookup; scales between buckets use the closest bucket below.
pub fn visible_count(class: DisplayClass, scale_percent: u32) -> usize {
    let column = SCALE_BUCKETS
        .iter()
        .rposition(|bucket| scale_percent >= *bucket)
        .unwrap_or(0);
    VISIBLE_COUNTS[class.row()][column]
}

/// Shown when the resolution or scale changed after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftWarning {
    pub startup: DisplayProfile,
    pub current: DisplayProfile,
}

impl DriftWarning {
    pub fn message(&self) -> String {
        format!(
            "显示设置已变更 Display changed: {:?} {}% -> {:?} {}%, restart the display for best layout",
            self.startup.class(),
            self.startup.scale_percent(),
            self.current.class(),
            self.current.scale_percent()
        )
    }
}

/// Compares the live profile with the one captured at startup.
#[derive(Debug, Clone)]
pub struct ProfileMonitor {
    startup: DisplayProfile,
}

impl ProfileMonitor {
    pub fn new(startup: DisplayProfile) -> Self {
        Self { startup }
    }

    pub fn startup(&self) -> DisplayProfile {
        self.startup
    }

    /// A warning when the display class or scale differs from startup.
    pub fn check(&self, current: DisplayProfile) -> Option<DriftWarning> {
        let drifted = current.class() != self.startup.class()
            || current.scale_percent() != self.startup.scale_percent();
        drifted.then(|| DriftWarning {
            startup: self.startup,
            current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_physical_resolution() {
        assert_eq!(DisplayProfile::new(1920, 1080, 1.0).class(), DisplayClass::Hd);
        assert_eq!(DisplayProfile::new(1280, 720, 2.0).class(), DisplayClass::Qhd);
        assert_eq!(DisplayProfile::new(1920, 1080, 2.0).class(), DisplayClass::Uhd);
    }

    #[test]
    fn counts_shrink_with_scale_and_on_4k() {
        assert_eq!(visible_count(DisplayClass::Hd, 100), 20);
        assert_eq!(visible_count(DisplayClass::Hd, 140), 16);
        assert_eq!(visible_count(DisplayClass::Hd, 90), 20);
        assert_eq!(visible_count(DisplayClass::Hd, 300), 8);
        assert!(visible_count(DisplayClass::Uhd, 150) < visible_count(DisplayClass::Hd, 150));
    }

    #[test]
    fn monitor_reports_drift_only_on_change() {
        let monitor = ProfileMonitor::new(DisplayProfile::new(1920, 1080, 1.0));
        assert!(monitor.check(DisplayProfile::new(1900, 1000, 1.0)).is_none());
        let warning = monitor
            .check(DisplayProfile::new(1920, 1080, 1.25))
            .expect("scale change is drift");
        assert!(warning.message().contains("125%"));
    }

    #[test]
    fn invalid_ratio_defaults_to_one() {
        assert_eq!(DisplayProfile::new(800, 600, f64::NAN).scale_percent(), 100);
    }
}
