pub mod format;
pub mod list;
pub mod threads;
pub mod top;
pub mod tree;
pub mod view;
