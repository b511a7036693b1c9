pub mod audio;
pub mod config;
pub mod graphics;
pub mod offline;
pub mod visual;
