//! Data models for catalog harvesting.

mod category;
mod product;

pub use category::{select_categories, CategoryDescriptor};
pub use product::{has_positive_price, ProductRecord, RecordSource};
