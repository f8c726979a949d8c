use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;

use PortState::*;

/// Physical devices of the spectrograph, each wired to one relay.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Port {
    Mirror,
    Led,
    ThAr,
    Tung,
}

impl Port {
    /// Fixed order in which ports are commanded and reported.
    pub const ALL: [Port; 4] = [Port::Mirror, Port::Led, Port::ThAr, Port::Tung];

    pub fn relay(&self) -> u8 {
        match self {
            Port::Mirror => 1,
            Port::Led => 2,
            Port::ThAr => 3,
            Port::Tung => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Port::Mirror => "Mirror",
            Port::Led => "LED",
            Port::ThAr => "ThAr",
            Port::Tung => "Tung",
        }
    }

    fn position(&self) -> usize {
        match self {
            Port::Mirror => 0,
            Port::Led => 1,
            Port::ThAr => 2,
            Port::Tung => 3,
        }
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PortState {
    On,
    Off,
}

/// Display color of a status.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Success,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    #[serde(rename = "value")]
    pub state: PortState,
    #[serde(rename = "color")]
    pub severity: Severity,
}

impl PortStatus {
    pub const ON: PortStatus = PortStatus {
        state: On,
        severity: Severity::Success,
    };

    pub const OFF: PortStatus = PortStatus {
        state: Off,
        severity: Severity::Warning,
    };

    pub fn is_on(&self) -> bool {
        self.state == On
    }
}

impl From<PortState> for PortStatus {
    fn from(state: PortState) -> Self {
        match state {
            On => PortStatus::ON,
            Off => PortStatus::OFF,
        }
    }
}

/// Status of all four ports. Serializes as a map keyed by port name in
/// [`Port::ALL`] order.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct PortStatusMap([PortStatus; 4]);

impl PortStatusMap {
    pub fn new(mirror: PortState, led: PortState, thar: PortState, tung: PortState) -> Self {
        PortStatusMap([mirror.into(), led.into(), thar.into(), tung.into()])
    }

    pub fn get(&self, port: Port) -> PortStatus {
        self.0[port.position()]
    }

    pub fn set(&mut self, port: Port, status: PortStatus) {
        self.0[port.position()] = status;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Port, PortStatus)> + '_ {
        Port::ALL.iter().map(move |port| (*port, self.get(*port)))
    }
}

impl Default for PortStatusMap {
    fn default() -> Self {
        ObservingMode::Object.ports()
    }
}

impl Serialize for PortStatusMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Port::ALL.len()))?;
        for (port, status) in self.iter() {
            map.serialize_entry(port.name(), &status)?;
        }
        map.end()
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObservingMode {
    Object,
    Dark,
    Flat,
    ThAr,
}

impl ObservingMode {
    pub const ALL: [ObservingMode; 4] = [
        ObservingMode::Object,
        ObservingMode::Dark,
        ObservingMode::Flat,
        ObservingMode::ThAr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ObservingMode::Object => "object",
            ObservingMode::Dark => "dark",
            ObservingMode::Flat => "flat",
            ObservingMode::ThAr => "thar",
        }
    }

    /// Target status of every port in this mode.
    pub fn ports(&self) -> PortStatusMap {
        match self {
            ObservingMode::Object => PortStatusMap::new(Off, Off, Off, Off),
            ObservingMode::Dark => PortStatusMap::new(On, Off, Off, Off),
            ObservingMode::Flat => PortStatusMap::new(On, On, Off, Off),
            ObservingMode::ThAr => PortStatusMap::new(On, Off, On, Off),
        }
    }
}

impl Display for ObservingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownModeError(pub String);

impl FromStr for ObservingMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object" => Ok(ObservingMode::Object),
            "dark" => Ok(ObservingMode::Dark),
            "flat" => Ok(ObservingMode::Flat),
            "thar" => Ok(ObservingMode::ThAr),
            unknown => Err(UnknownModeError(unknown.to_string())),
        }
    }
}
