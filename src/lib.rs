pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod refresh;
pub mod source;
pub mod venue;
