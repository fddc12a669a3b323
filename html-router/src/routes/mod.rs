pub mod conversations;
pub mod documents;
pub mod index;
pub mod sessions;
