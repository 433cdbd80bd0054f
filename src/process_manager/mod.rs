// External predictor process management
pub mod command_worker;

pub use command_worker::{CommandPredictor, WorkerMessage};
