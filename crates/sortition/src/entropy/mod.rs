mod pool;
mod source;

pub use pool::*;
pub use source::*;
