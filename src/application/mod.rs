// Application layer - Use cases orchestrating the document store
pub mod cooling_engine;
pub mod telemetry_store;
