//! Tests for the energy dispersion algebra

mod edisp_tests;
