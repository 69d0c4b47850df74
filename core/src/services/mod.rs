pub mod export;
pub mod thumbnail;
