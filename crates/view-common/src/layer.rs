//! Layer identity and per-layer presentation settings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ViewError;

/// Unique identifier for a layer in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a layer's raster is combined with what lies beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// Standard alpha blending ("over")
    #[default]
    SourceOver,
    /// Additive blending, saturating at 255
    Plus,
    /// Channel-wise multiply
    Multiply,
}

impl FromStr for CompositionMode {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source_over" | "sourceover" | "alpha" | "over" => Ok(CompositionMode::SourceOver),
            "plus" | "add" | "additive" => Ok(CompositionMode::Plus),
            "multiply" => Ok(CompositionMode::Multiply),
            other => Err(ViewError::invalid_parameter(
                "composition_mode",
                format!("unknown mode '{}'", other),
            )),
        }
    }
}

/// Presentation settings for one layer of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub visible: bool,
    /// Mask alpha applied to the whole layer (255 = opaque)
    pub opacity: u8,
    /// Optional mask tint; replaces the layer's color, keeping its alpha
    pub mask_color: Option<[u8; 3]>,
    pub composition: CompositionMode,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 255,
            mask_color: None,
            composition: CompositionMode::SourceOver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_mode_parse() {
        assert_eq!(
            "Plus".parse::<CompositionMode>().unwrap(),
            CompositionMode::Plus
        );
        assert_eq!(
            "alpha".parse::<CompositionMode>().unwrap(),
            CompositionMode::SourceOver
        );
        assert!("screen".parse::<CompositionMode>().is_err());
    }

    #[test]
    fn test_layer_id_display() {
        assert_eq!(LayerId::new("m31:cube").to_string(), "m31:cube");
    }
}
