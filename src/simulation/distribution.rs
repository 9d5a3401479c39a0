use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Sampling rule applied to one axis of a body's position or velocity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DistributionCode {
    /// `sin(latitude) * cos(longitude)` on the sphere surface.
    SphereCos,
    /// `sin(latitude) * sin(longitude)` on the sphere surface.
    SphereSin,
    /// `cos(latitude)` on the sphere surface.
    SphereCosLat,
    RandomSigned,
    Zero,
    /// Power-law disc; the fallback for anything unrecognised.
    #[default]
    DiscPowerLaw,
    /// Rigid-rotation-like flow (velocity only).
    Circular,
    /// Circular orbit speed from the enclosed disc mass (velocity only).
    Keplerian,
}

impl DistributionCode {
    pub const ALL: [DistributionCode; 8] = [
        Self::SphereCos,
        Self::SphereSin,
        Self::SphereCosLat,
        Self::RandomSigned,
        Self::Zero,
        Self::DiscPowerLaw,
        Self::Circular,
        Self::Keplerian,
    ];

    /// Rule actually used when this code drives a position axis.
    pub fn for_position(self) -> Self {
        match self {
            Self::Circular | Self::Keplerian => Self::DiscPowerLaw,
            code => code,
        }
    }

    /// Rule actually used when this code drives a velocity axis.
    pub fn for_velocity(self) -> Self {
        match self {
            Self::SphereCosLat | Self::DiscPowerLaw => Self::Keplerian,
            code => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SphereCos => "sphere-cos",
            Self::SphereSin => "sphere-sin",
            Self::SphereCosLat => "sphere-cos-lat",
            Self::RandomSigned => "random-signed",
            Self::Zero => "zero",
            Self::DiscPowerLaw => "disc",
            Self::Circular => "circular",
            Self::Keplerian => "keplerian",
        }
    }
}

impl fmt::Display for DistributionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Never fails: unknown spellings map to the disc fallback.
impl FromStr for DistributionCode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s.trim() {
            "RSC" => Self::SphereCos,
            "RSS" => Self::SphereSin,
            "RC" => Self::SphereCosLat,
            "RL" => Self::RandomSigned,
            "R0" => Self::Zero,
            "CRR" => Self::Keplerian,
            "CR" => Self::Circular,
            other => match other.to_ascii_lowercase().replace('_', "-").as_str() {
                "sphere-cos" => Self::SphereCos,
                "sphere-sin" => Self::SphereSin,
                "sphere-cos-lat" => Self::SphereCosLat,
                "random-signed" | "random" => Self::RandomSigned,
                "zero" => Self::Zero,
                "circular" => Self::Circular,
                "keplerian" => Self::Keplerian,
                "disc" | "disc-powerlaw" | "disc-power-law" => Self::DiscPowerLaw,
                _ => {
                    log::warn!("unknown distribution code {other:?}, using {}", Self::DiscPowerLaw);
                    Self::DiscPowerLaw
                }
            },
        };
        Ok(code)
    }
}

/// One code per axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AxisDistributions {
    pub x: DistributionCode,
    pub y: DistributionCode,
    pub z: DistributionCode,
}

impl AxisDistributions {
    pub const fn uniform(code: DistributionCode) -> Self {
        Self {
            x: code,
            y: code,
            z: code,
        }
    }

    pub const fn new(x: DistributionCode, y: DistributionCode, z: DistributionCode) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DistributionCode {
        match s.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }

    #[test]
    fn legacy_codes_parse() {
        assert_eq!(parse("RSC"), DistributionCode::SphereCos);
        assert_eq!(parse("RSS"), DistributionCode::SphereSin);
        assert_eq!(parse("RC"), DistributionCode::SphereCosLat);
        assert_eq!(parse("RL"), DistributionCode::RandomSigned);
        assert_eq!(parse("R0"), DistributionCode::Zero);
        assert_eq!(parse("CR"), DistributionCode::Circular);
        assert_eq!(parse("CRR"), DistributionCode::Keplerian);
    }

    #[test]
    fn names_round_trip() {
        for code in DistributionCode::ALL {
            assert_eq!(parse(code.name()), code);
        }
    }

    #[test]
    fn typos_fall_back_to_disc() {
        assert_eq!(parse("RXX"), DistributionCode::DiscPowerLaw);
        assert_eq!(parse(""), DistributionCode::DiscPowerLaw);
        assert_eq!(parse("RXX").for_velocity(), DistributionCode::Keplerian);
    }

    #[test]
    fn velocity_only_codes_fall_back_for_positions() {
        assert_eq!(DistributionCode::Circular.for_position(), DistributionCode::DiscPowerLaw);
        assert_eq!(DistributionCode::Keplerian.for_position(), DistributionCode::DiscPowerLaw);
        assert_eq!(DistributionCode::Zero.for_position(), DistributionCode::Zero);
        assert_eq!(DistributionCode::Circular.for_velocity(), DistributionCode::Circular);
    }
}
