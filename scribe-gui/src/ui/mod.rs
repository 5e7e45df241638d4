//! # UI Module
//!
//! Layout of the Notescribe window.

pub mod main_display;
