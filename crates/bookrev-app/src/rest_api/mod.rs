pub mod book;
mod paging;
pub mod review;

pub use paging::{Page, Paging};
