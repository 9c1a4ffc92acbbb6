//! Tests for the parameter system

mod parameter_tests;
mod parameters_tests;
