//! Satellites with a known publication product.

use std::fmt;
use std::str::FromStr;

use crate::error::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Satellite {
    ElectroL2,
    Himawari8,
    Goes16,
    Goes17,
}

impl Satellite {
    pub const ALL: [Satellite; 4] = [
        Satellite::ElectroL2,
        Satellite::Himawari8,
        Satellite::Goes16,
        Satellite::Goes17,
    ];

    /// Identifier used on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Satellite::ElectroL2 => "electro_l2",
            Satellite::Himawari8 => "himawari8",
            Satellite::Goes16 => "goes16",
            Satellite::Goes17 => "goes17",
        }
    }

    /// Product published for this satellite.
    pub fn product_name(&self) -> &'static str {
        match self {
            Satellite::ElectroL2 => "ELECTRO_L_2_RGB_GEOSERVER",
            Satellite::Himawari8 => "AHI_L2_RGB_GEOSERVER",
            Satellite::Goes16 => "ABI_L2_G16_RGB_GEOSERVER",
            Satellite::Goes17 => "ABI_L2_G17_RGB_GEOSERVER",
        }
    }
}

impl FromStr for Satellite {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Satellite::ALL
            .into_iter()
            .find(|sat| sat.id() == s)
            .ok_or_else(|| PublishError::UnknownSatellite(s.to_string()))
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
