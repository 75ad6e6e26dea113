pub mod document;
pub mod enums;
pub mod items;

pub use document::*;
pub use enums::*;
pub use items::*;
