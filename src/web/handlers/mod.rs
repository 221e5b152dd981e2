pub mod image;
pub mod play;
pub mod revalidate;
