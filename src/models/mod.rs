mod video;

pub use video::*;
