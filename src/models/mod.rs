pub mod document;
pub mod resource;
pub mod search;
pub mod space;

pub use document::*;
pub use resource::*;
pub use search::*;
pub use space::*;
