use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for project objects.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        // index+1 must be nonzero
        Self(NonZeroU32::new(index + 1).expect("index+1 is nonzero"))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Domain-specific ID aliases for clarity (no runtime cost).
pub type GaugeId = Id;
pub type NodeId = Id;
pub type LinkId = Id;
pub type PollutId = Id;

/// Classes of project objects addressable through the typed property
/// interface and the object-inventory API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Gauge = 0,
    Subcatchment = 1,
    Node = 2,
    Link = 3,
    Pollutant = 4,
    TimeSeries = 5,
    Curve = 6,
    Pattern = 7,
    System = 9,
}

impl ObjectKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Gauge),
            1 => Some(Self::Subcatchment),
            2 => Some(Self::Node),
            3 => Some(Self::Link),
            4 => Some(Self::Pollutant),
            5 => Some(Self::TimeSeries),
            6 => Some(Self::Curve),
            7 => Some(Self::Pattern),
            9 => Some(Self::System),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_u32, 1, 2, 42, 10_000] {
            let id = Id::from_index(i);
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn option_id_is_small() {
        // This is a classic reason for NonZero: Option<Id> can be same size as Id.
        assert_eq!(
            core::mem::size_of::<Id>(),
            core::mem::size_of::<Option<Id>>()
        );
    }

    #[test]
    fn object_kind_codes() {
        assert_eq!(ObjectKind::from_code(2), Some(ObjectKind::Node));
        assert!(ObjectKind::from_code(8).is_none());
    }
}
