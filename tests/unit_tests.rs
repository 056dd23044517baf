//! Unit tests for individual components, run as one integration binary.

mod common;
mod unit;
