pub mod claim;
pub mod market;
pub mod opportunity;
pub mod position;

pub use claim::*;
pub use market::*;
pub use opportunity::*;
pub use position::*;
