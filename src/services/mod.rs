pub mod engine;
pub mod low_stock;
