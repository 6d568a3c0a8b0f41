//! Services file parsing and argument substitution

mod services_file;
mod substitution;

pub use services_file::*;
pub use substitution::*;
