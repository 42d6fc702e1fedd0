//! Query execution and result streaming.

pub mod cursor;
pub mod results;

pub use cursor::{Cursor, CursorState, Description};
pub use results::{is_null, trim_decimal, Dest, Value};
