pub mod realtime;
pub mod simulated;
#[cfg(feature = "socat")]
pub mod socat_port;
pub mod trinamic;
