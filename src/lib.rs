pub mod app;
pub mod auth;
pub mod cli;
pub mod completion;
pub mod config;
pub mod demos;
pub mod flatten;
pub mod output;
pub mod render;
pub mod runner;
pub mod stream;
pub mod workbook;

#[cfg(test)]
mod tests;
