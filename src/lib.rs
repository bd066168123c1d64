#![forbid(unsafe_code)]

pub mod cli;
pub mod discover;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod openai;
pub mod pipeline;
pub mod scratch;
