#![forbid(unsafe_code)]

pub mod table;
pub mod tasks;
