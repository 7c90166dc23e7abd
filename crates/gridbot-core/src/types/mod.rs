//! 공통 타입 정의.

pub mod decimal;
pub mod symbol;

pub use decimal::*;
pub use symbol::*;
