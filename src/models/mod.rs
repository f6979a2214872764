mod purchase;

pub use purchase::*;
