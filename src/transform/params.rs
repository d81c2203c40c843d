use crate::config::ImageFormat;
use crate::LogoKitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest edge, in pixels, a caller may request.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest pixel count a resize may produce, intermediates included.
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

/// How a resize reconciles the source aspect ratio with a width+height box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fill the box, cropping the overflow around the centre.
    Cover,
    /// Fit within the box and pad the remainder with the background colour.
    Contain,
    /// Stretch to the exact box, ignoring aspect ratio.
    Fill,
    /// Fit within the box, keeping aspect ratio.
    Inside,
    /// Cover the box, keeping aspect ratio, without cropping.
    Outside,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Cover => write!(f, "cover"),
            FitMode::Contain => write!(f, "contain"),
            FitMode::Fill => write!(f, "fill"),
            FitMode::Inside => write!(f, "inside"),
            FitMode::Outside => write!(f, "outside"),
        }
    }
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            "fill" => Ok(FitMode::Fill),
            "inside" => Ok(FitMode::Inside),
            "outside" => Ok(FitMode::Outside),
            _ => Err(format!("Invalid fit mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Parameters for one derivative. Unset fields fall back to pipeline config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Downscale-only bound applied after the fit resize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,

    /// Output format; the source format is kept when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<[u8; 4]>,

    /// Region of the source to keep, applied before resizing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
}

impl TransformOptions {
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn has_resize(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }

    pub fn validate(&self) -> Result<(), LogoKitError> {
        let dims = [
            ("width", self.width),
            ("height", self.height),
            ("max_width", self.max_width),
            ("max_height", self.max_height),
        ];
        for (name, value) in dims {
            if let Some(v) = value {
                if v == 0 || v > MAX_DIMENSION {
                    return Err(LogoKitError::InvalidOptions(format!(
                        "{} must be within 1..={}, got {}",
                        name, MAX_DIMENSION, v
                    )));
                }
            }
        }
        if let Some(q) = self.quality {
            if q == 0 || q > 100 {
                return Err(LogoKitError::InvalidOptions(format!("quality must be within 1..=100, got {}", q)));
            }
        }
        if let Some(crop) = self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(LogoKitError::InvalidOptions("crop must have a non-zero area".into()));
            }
        }
        Ok(())
    }
}

impl FromStr for TransformOptions {
    type Err = serde_urlencoded::de::Error;

    /// Parse a query string such as `width=200&format=webp&fit=cover`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_urlencoded::from_str(s)
    }
}
