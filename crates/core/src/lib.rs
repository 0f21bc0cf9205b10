//! Core data types for the gas price notification bot.

pub mod category;
pub mod criterion;
pub mod operator;
pub mod price;
pub mod subscriber;
pub mod validate;

pub use category::*;
pub use criterion::*;
pub use operator::*;
pub use price::*;
pub use subscriber::*;
pub use validate::*;
