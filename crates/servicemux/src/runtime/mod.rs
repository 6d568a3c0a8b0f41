//! Runtime components: launching, stream reading, fan-in and supervision

pub mod launcher;
pub mod multiplexer;
pub mod reader;
pub mod sanitize;
pub mod supervisor;

pub use launcher::*;
pub use multiplexer::*;
pub use reader::*;
pub use sanitize::*;
pub use supervisor::*;
