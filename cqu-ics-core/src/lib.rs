//! CQU ICS Core Library
//!
//! This library logs into the CQU academic administration portal
//! (jxgl.cqu.edu.cn), scrapes timetable and exam data from its
//! server-rendered HTML, and turns the result into ICS calendar files.

pub mod error;
pub mod ics;
pub mod materialize;
pub mod parser;
pub mod schedule;
pub mod scores;
pub mod session;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{ics::*, materialize::*, parser::*, schedule::*, session::*, types::*};
}
