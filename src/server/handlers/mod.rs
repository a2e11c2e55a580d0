pub mod assets;
pub mod classify;
