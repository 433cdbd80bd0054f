// Data models (structs)
pub mod job;
pub mod prediction;
pub mod settings;
pub mod table;

pub use job::*;
pub use prediction::*;
pub use settings::*;
pub use table::*;
