//! Race-kind vocabulary shared by the safety-property loader and the
//! trace analyzer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four classified shapes of a concurrency race between two
/// transitions. The serialized names are fixed and appear verbatim in
/// property files, race-report file names, and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceKind {
    /// Two switches process packets concurrently.
    #[serde(rename = "SW-SW")]
    SwSw,
    /// A controller reconfigures a switch while that switch processes
    /// a packet.
    #[serde(rename = "CT->SW")]
    CtSw,
    /// Two controllers reconfigure the same switch concurrently.
    #[serde(rename = "CT->SW<-CT")]
    CtSwCt,
    /// A controller updates another controller while the latter has a
    /// reconfiguration of a switch in flight.
    #[serde(rename = "CT->CT->SW")]
    CtCtSw,
}

impl RaceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SwSw => "SW-SW",
            Self::CtSw => "CT->SW",
            Self::CtSwCt => "CT->SW<-CT",
            Self::CtCtSw => "CT->CT->SW",
        }
    }
}

impl fmt::Display for RaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(RaceKind::SwSw.to_string(), "SW-SW");
        assert_eq!(RaceKind::CtSw.to_string(), "CT->SW");
        assert_eq!(RaceKind::CtSwCt.to_string(), "CT->SW<-CT");
        assert_eq!(RaceKind::CtCtSw.to_string(), "CT->CT->SW");
    }

    #[test]
    fn serde_uses_the_display_names() {
        let kind: RaceKind = serde_json::from_str("\"CT->SW<-CT\"").unwrap();
        assert_eq!(kind, RaceKind::CtSwCt);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"CT->SW<-CT\"");
    }
}
