pub mod audit;
pub mod enums;
pub mod patient;
pub mod principal;

pub use audit::*;
pub use enums::*;
pub use patient::*;
pub use principal::*;
