// Domain layer - Sensor readings, control state and the cooling decision
pub mod control;
pub mod cooling;
pub mod display;
pub mod error;
pub mod sensor;
