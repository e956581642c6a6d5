//! Sky coordinate systems a view can be drawn in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ViewError;

/// Well-known sky coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SkyCoordinateSystem {
    /// Equatorial, FK5 at epoch J2000
    #[default]
    J2000,
    /// Equatorial, FK4 at epoch B1950
    B1950,
    /// International Celestial Reference System
    Icrs,
    /// Galactic longitude/latitude
    Galactic,
    /// Ecliptic longitude/latitude
    Ecliptic,
    /// Raw pixel coordinates of the image
    Image,
}

impl SkyCoordinateSystem {
    pub const ALL: [SkyCoordinateSystem; 6] = [
        SkyCoordinateSystem::J2000,
        SkyCoordinateSystem::B1950,
        SkyCoordinateSystem::Icrs,
        SkyCoordinateSystem::Galactic,
        SkyCoordinateSystem::Ecliptic,
        SkyCoordinateSystem::Image,
    ];

    /// Stable name used in cache keys and session files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkyCoordinateSystem::J2000 => "J2000",
            SkyCoordinateSystem::B1950 => "B1950",
            SkyCoordinateSystem::Icrs => "ICRS",
            SkyCoordinateSystem::Galactic => "GALACTIC",
            SkyCoordinateSystem::Ecliptic => "ECLIPTIC",
            SkyCoordinateSystem::Image => "IMAGE",
        }
    }

    /// Whether the system is tied to the celestial equator.
    pub fn is_equatorial(&self) -> bool {
        matches!(
            self,
            SkyCoordinateSystem::J2000 | SkyCoordinateSystem::B1950 | SkyCoordinateSystem::Icrs
        )
    }
}

impl FromStr for SkyCoordinateSystem {
    type Err = ViewError;

    /// Accepts the canonical names case-insensitively, plus a few common aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "J2000" | "FK5" => Ok(SkyCoordinateSystem::J2000),
            "B1950" | "FK4" => Ok(SkyCoordinateSystem::B1950),
            "ICRS" => Ok(SkyCoordinateSystem::Icrs),
            "GALACTIC" | "GAL" => Ok(SkyCoordinateSystem::Galactic),
            "ECLIPTIC" | "ECL" => Ok(SkyCoordinateSystem::Ecliptic),
            "IMAGE" | "PIXEL" => Ok(SkyCoordinateSystem::Image),
            _ => Err(ViewError::UnknownCoordinateSystem(s.to_string())),
        }
    }
}

impl fmt::Display for SkyCoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
