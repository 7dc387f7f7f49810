mod batch_source;
mod handler;
mod pagination;
mod repository;

pub use batch_source::*;
pub use handler::*;
pub use pagination::*;
pub use repository::*;
