pub mod error;
pub mod logger;
pub mod validation;

pub use logger::mask_secret;
