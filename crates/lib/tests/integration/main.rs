mod common;

mod compare_tests;
mod generate_tests;
mod golden_tests;
mod resolve_tests;
