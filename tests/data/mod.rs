//! Tests for the data store and the index builder

mod data_store_tests;
mod maker_tests;
