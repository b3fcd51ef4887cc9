mod model;
mod sqlite;
#[cfg(test)]
mod tests;
mod uniform;

pub use model::*;
pub use sqlite::*;
pub use uniform::*;
