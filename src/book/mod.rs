//! Scenario books.
//!
//! A book is a YAML file that declares the runners, seed variables and
//! steps of one scenario.

mod parser;
mod schema;

pub use parser::{discover_books, parse_book, parse_book_str, parse_duration};
pub use schema::{Book, Interval, Steps};
