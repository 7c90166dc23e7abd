//! 도메인 모델.

pub mod grid;
pub mod market;
pub mod order;
pub mod step;
pub mod sync;

pub use grid::*;
pub use market::*;
pub use order::*;
pub use step::*;
pub use sync::*;
