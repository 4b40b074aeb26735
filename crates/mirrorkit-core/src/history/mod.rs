//! Commit history walking and change computation

pub mod changes;
pub mod walker;

pub use changes::{diff_trees, ChangeComputer};
pub use walker::ChangeWalker;
