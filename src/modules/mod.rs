pub mod base;
pub mod classifier;
pub mod generator;
pub mod image_loader;
pub mod metadata;
pub mod rate_limiter;
pub mod renamer;
pub mod sanitizer;
pub mod scanner;
