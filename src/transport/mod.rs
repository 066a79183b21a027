pub mod telemetry;
pub mod traits;
pub mod replay;
pub mod udp;

#[cfg(test)]
pub mod fake;

pub use telemetry::TelemetryReader;
pub use traits::{Telemetry, Transport};
pub use replay::FrameReplay;
pub use udp::{FrameFeed, UdpTransport};
