mod alphabet;
mod authority;

pub use alphabet::*;
pub use authority::*;
