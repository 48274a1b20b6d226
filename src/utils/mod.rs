//! Small shared helpers: XML fragment building and URL handling.

pub mod url;
pub mod xml;
