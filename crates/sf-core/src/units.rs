//! Conversion between internal units and the user's unit system.
//!
//! Internally the engine works in feet/seconds-derived units; every value
//! crossing the property interface or the results file is converted with a
//! fixed factor indexed by `(Quantity, UnitSystem)` for scalar quantities
//! and by [`FlowUnits`] for flows.

/// User-facing unit system, derived from the configured flow units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSystem {
    Us = 0,
    Si = 1,
}

/// Flow units carried in the output-file header (codes 0..5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowUnits {
    Cfs = 0,
    Gpm = 1,
    Mgd = 2,
    Cms = 3,
    Lps = 4,
    Mld = 5,
}

/// Quantity classes with distinct conversion factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Rainfall = 0,
    RainDepth = 1,
    EvapRate = 2,
    Length = 3,
    LandArea = 4,
    Volume = 5,
    WindSpeed = 6,
    Temperature = 7,
    Mass = 8,
    GwFlow = 9,
    Flow = 10,
}

// user units --> internal units, [US, SI] per quantity class
const UCF: [[f64; 2]; 10] = [
    [43_200.0, 1_097_280.0],     // RAINFALL (in/hr, mm/hr -> ft/s)
    [12.0, 304.8],               // RAINDEPTH (in, mm -> ft)
    [1_036_800.0, 26_334_720.0], // EVAPRATE (in/day, mm/day -> ft/s)
    [1.0, 0.3048],               // LENGTH (ft, m -> ft)
    [2.2956e-5, 0.92903e-5],     // LANDAREA (ac, ha -> ft2)
    [1.0, 0.02832],              // VOLUME (ft3, m3 -> ft3)
    [1.0, 1.608],                // WINDSPEED (mph, km/hr -> mph)
    [1.0, 1.8],                  // TEMPERATURE (deg F, deg C -> deg F)
    [2.203e-6, 1.0e-6],          // MASS (lb, kg -> mg)
    [43_560.0, 3_048.0],         // GWFLOW (cfs/ac, cms/ha -> ft/s)
];

// flow: cfs, gpm, mgd, cms, lps, mld -> cfs
const QCF: [f64; 6] = [1.0, 448.831, 0.64632, 0.02832, 28.317, 2.4466];

impl FlowUnits {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Cfs),
            1 => Some(Self::Gpm),
            2 => Some(Self::Mgd),
            3 => Some(Self::Cms),
            4 => Some(Self::Lps),
            5 => Some(Self::Mld),
            _ => None,
        }
    }

    /// CMS and smaller-granularity metric units imply SI.
    pub fn unit_system(self) -> UnitSystem {
        if (self as i32) < (Self::Cms as i32) {
            UnitSystem::Us
        } else {
            UnitSystem::Si
        }
    }
}

/// Conversion factor from internal units to the user's units for `q`.
///
/// Multiply an internal value by the factor to express it in user units;
/// divide a user value to store it internally.
pub fn ucf(q: Quantity, system: UnitSystem, flow: FlowUnits) -> f64 {
    match q {
        Quantity::Flow => QCF[flow as usize],
        _ => UCF[q as usize][system as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_units_imply_unit_system() {
        assert_eq!(FlowUnits::Cfs.unit_system(), UnitSystem::Us);
        assert_eq!(FlowUnits::Mgd.unit_system(), UnitSystem::Us);
        assert_eq!(FlowUnits::Cms.unit_system(), UnitSystem::Si);
        assert_eq!(FlowUnits::Mld.unit_system(), UnitSystem::Si);
    }

    #[test]
    fn flow_factor_selected_by_flow_units() {
        assert_eq!(ucf(Quantity::Flow, UnitSystem::Us, FlowUnits::Cfs), 1.0);
        assert_eq!(ucf(Quantity::Flow, UnitSystem::Si, FlowUnits::Lps), 28.317);
    }

    #[test]
    fn scalar_factor_selected_by_unit_system() {
        assert_eq!(ucf(Quantity::Length, UnitSystem::Us, FlowUnits::Cfs), 1.0);
        assert_eq!(
            ucf(Quantity::Length, UnitSystem::Si, FlowUnits::Cms),
            0.3048
        );
    }

    #[test]
    fn round_trip_within_one_ulp() {
        let factor = ucf(Quantity::Rainfall, UnitSystem::Si, FlowUnits::Cms);
        let user = 3.6_f64;
        let internal = user / factor;
        assert!((internal * factor - user).abs() <= f64::EPSILON * user);
    }

    #[test]
    fn from_code_bounds() {
        assert_eq!(FlowUnits::from_code(5), Some(FlowUnits::Mld));
        assert!(FlowUnits::from_code(6).is_none());
        assert!(FlowUnits::from_code(-1).is_none());
    }
}
