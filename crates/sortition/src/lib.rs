#![doc = include_str!("../README.md")]

mod entropy;
mod error;
mod id;
mod request;
mod store;
mod time;

pub use crate::entropy::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::request::*;
pub use crate::store::*;
pub use crate::time::*;
