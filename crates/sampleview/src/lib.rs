pub mod calltree;
pub mod cli;
pub mod commands;
pub mod error;
pub mod memo;
pub mod ops;
pub mod profile;
pub mod selectors;
pub mod state;
pub mod storage;
pub mod summary;
pub mod transforms;

pub use error::{Error, Result};
