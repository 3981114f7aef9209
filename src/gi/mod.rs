//! Global illumination: irradiance probes and reflection probes

pub mod irradiance;
pub mod reflection;
pub mod sh;

pub use irradiance::{IrradianceGrid, Probe};
pub use reflection::ReflectionProbe;
pub use sh::SphericalHarmonics;
