pub mod asset;
pub mod source;
