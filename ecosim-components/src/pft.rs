//! Mapping from ecosystem type to EcoSIM plant functional type.

use serde::Serialize;
use std::fmt;

use ecosim_core::site::EcosystemType;

/// An EcoSIM plant functional type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PftCode {
    /// Short code written into the PFT file
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl PftCode {
    const fn new(code: &'static str, name: &'static str, description: &'static str) -> Self {
        Self {
            code,
            name,
            description,
        }
    }

    /// Planting description written into the PFT file.
    pub fn planting_info(&self) -> String {
        format!("Natural {} vegetation", self.name.to_lowercase())
    }
}

impl fmt::Display for PftCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}

pub static PFT_TUNDRA: PftCode = PftCode::new(
    "DGS",
    "Deciduous Grass/Shrub",
    "Arctic/alpine tundra vegetation",
);
pub static PFT_FOREST: PftCode = PftCode::new(
    "DBF",
    "Deciduous Broadleaf Forest",
    "Temperate deciduous forest",
);
pub static PFT_SHRUB: PftCode =
    PftCode::new("DSH", "Deciduous Shrub", "Heathland and shrubland");
pub static PFT_GRASSLAND: PftCode = PftCode::new("C3G", "C3 Grass", "Temperate grassland");
pub static PFT_CROPLAND: PftCode = PftCode::new("CRP", "Crop", "Agricultural cropland");
pub static PFT_PEAT: PftCode = PftCode::new("WET", "Wetland", "Peatland vegetation");

/// PFT of an ecosystem. Absent ecosystems get the grassland type.
///
/// ```rust
/// use ecosim_components::pft::map_ecosystem_to_pft;
/// use ecosim_core::site::EcosystemType;
///
/// let pft = map_ecosystem_to_pft(Some(EcosystemType::Forest));
/// assert_eq!(pft.code, "DBF");
/// assert_eq!(map_ecosystem_to_pft(None).code, "C3G");
/// ```
pub fn map_ecosystem_to_pft(ecosystem: Option<EcosystemType>) -> &'static PftCode {
    match ecosystem {
        Some(EcosystemType::Tundra) => &PFT_TUNDRA,
        Some(EcosystemType::Forest) => &PFT_FOREST,
        Some(EcosystemType::ShrubHeathland) => &PFT_SHRUB,
        Some(EcosystemType::GrasslandMeadowPrairie) | None => &PFT_GRASSLAND,
        Some(EcosystemType::Cropland) => &PFT_CROPLAND,
        Some(EcosystemType::Peat) => &PFT_PEAT,
    }
}
