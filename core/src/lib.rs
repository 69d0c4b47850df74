pub mod services;

pub use services::{export, thumbnail};
