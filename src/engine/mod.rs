pub mod copier;
pub mod ingest;
pub mod scanner;
pub mod thumbnails;
