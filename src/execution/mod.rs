pub mod engine;
pub mod powerbi_engine;
pub mod result;

pub use engine::*;
pub use powerbi_engine::*;
pub use result::*;
