//! Small shared helpers

pub mod string;
