//! Moving the working tree between commits
//!
//! A [`migration::Migration`] turns a tree diff into file system actions and
//! index updates. Every path is checked against local changes before the
//! first file is touched, and the collected [`conflict`]s abort the move
//! unless it is forced.

pub mod conflict;
pub mod migration;
