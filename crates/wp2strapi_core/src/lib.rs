pub mod config;
pub mod content;
pub mod destination;
pub mod media;
pub mod migrate;
pub mod source;
pub mod tour;
