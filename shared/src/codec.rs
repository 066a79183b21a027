//! State packet codec
//!
//! The drone broadcasts its state as a single ASCII datagram of
//! semicolon-terminated pairs:
//! ```text
//! pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:83;temph:85;tof:10;h:0;bat:88;baro:193.03;time:0;agx:-2.00;agy:-9.00;agz:-999.00;\r\n
//! ```
//! EDU firmware adds mission-pad fields (`mid`, `x`, `y`, `z`, `mpry`), which
//! are accepted and ignored.

use thiserror::Error;

/// Maximum state packet size accepted from the wire
pub const MAX_PACKET_SIZE: usize = 1024;

/// Errors that can occur while decoding a state packet
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateParseError {
    #[error("Packet too large: {0} bytes (max: {MAX_PACKET_SIZE})")]
    PacketTooLarge(usize),

    #[error("Packet is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed field (expected key:value): {0}")]
    MalformedField(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Decoded drone state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelloState {
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    /// Velocities in dm/s
    pub vgx: i32,
    pub vgy: i32,
    pub vgz: i32,
    /// Lowest and highest board temperature in °C
    pub templ: i32,
    pub temph: i32,
    /// Time-of-flight distance in cm
    pub tof: i32,
    /// Height above takeoff point in cm
    pub h: i32,
    /// Battery percentage
    pub bat: u32,
    /// Barometer altitude in m
    pub baro: f32,
    /// Motor-on time in seconds
    pub time: u32,
    pub agx: f32,
    pub agy: f32,
    pub agz: f32,
}

impl TelloState {
    /// Decode a raw datagram
    pub fn decode(buf: &[u8]) -> Result<Self, StateParseError> {
        if buf.len() > MAX_PACKET_SIZE {
            return Err(StateParseError::PacketTooLarge(buf.len()));
        }
        let text = std::str::from_utf8(buf).map_err(|_| StateParseError::InvalidUtf8)?;
        text.parse()
    }

    /// Average board temperature in °C
    pub fn temperature(&self) -> f32 {
        (self.templ + self.temph) as f32 / 2.0
    }

    /// Horizontal ground speed in cm/s
    pub fn ground_speed(&self) -> f32 {
        (self.vgx as f32).hypot(self.vgy as f32) * 10.0
    }
}

impl std::str::FromStr for TelloState {
    type Err = StateParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut state = TelloState::default();
        let mut seen_bat = false;
        let mut seen_h = false;

        for field in text.trim().split(';') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = field
                .split_once(':')
                .ok_or_else(|| StateParseError::MalformedField(field.to_string()))?;

            match key {
                "pitch" => state.pitch = parse_value(key, value)?,
                "roll" => state.roll = parse_value(key, value)?,
                "yaw" => state.yaw = parse_value(key, value)?,
                "vgx" => state.vgx = parse_value(key, value)?,
                "vgy" => state.vgy = parse_value(key, value)?,
                "vgz" => state.vgz = parse_value(key, value)?,
                "templ" => state.templ = parse_value(key, value)?,
                "temph" => state.temph = parse_value(key, value)?,
                "tof" => state.tof = parse_value(key, value)?,
                "h" => {
                    state.h = parse_value(key, value)?;
                    seen_h = true;
                }
                "bat" => {
                    state.bat = parse_value(key, value)?;
                    seen_bat = true;
                }
                "baro" => state.baro = parse_value(key, value)?,
                "time" => state.time = parse_value(key, value)?,
                "agx" => state.agx = parse_value(key, value)?,
                "agy" => state.agy = parse_value(key, value)?,
                "agz" => state.agz = parse_value(key, value)?,
                _ => {}
            }
        }

        if !seen_bat {
            return Err(StateParseError::MissingField("bat"));
        }
        if !seen_h {
            return Err(StateParseError::MissingField("h"));
        }
        Ok(state)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StateParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| StateParseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
