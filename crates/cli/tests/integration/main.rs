mod common;
mod run_tests;
