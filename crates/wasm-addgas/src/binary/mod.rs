//! Low-level byte reading and writing.
//!
//! [`Cursor`] and [`Writer`] are the only places that know how integers are
//! laid out on the wire; everything above them speaks in values.

mod cursor;
mod writer;

pub use cursor::Cursor;
pub use writer::Writer;
