pub mod after;
pub mod api;
pub mod cache;
pub mod images;
pub mod revalidate;
pub mod views;
