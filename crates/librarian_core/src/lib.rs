//! `librarian_core`
//!
//! Core library for the platform-independent logic of Librarian: the book catalog store and the
//! reading recommendation gateway. The terminal front end only wires user actions to the types
//! exposed here.

pub mod assistant;

pub mod database;
