pub mod docs;
pub mod media;
pub mod post;
