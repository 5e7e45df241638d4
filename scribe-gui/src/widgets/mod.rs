//! Custom canvas widgets.

pub mod kaleidoscope;
