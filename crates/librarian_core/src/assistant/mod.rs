//! Reading assistant
//!
//! Forwards free-text reading wishes to a chat model and memoizes the answers for a short while.
//! Failures never leave this module: callers always get text back, either the model's answer or a
//! fixed fallback suggestion.
pub mod cache;
pub mod client;
pub mod errors;
pub mod recommender;
