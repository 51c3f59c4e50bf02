// Application state for HTTP handlers
use crate::application::cooling_engine::CoolingEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: CoolingEngine,
}
