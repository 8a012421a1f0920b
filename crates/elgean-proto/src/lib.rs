//! Types shared by the Radio Elgean server and listener front end.

pub mod config;
pub mod metadata;
pub mod platform;
pub mod protocol;
pub mod track;
