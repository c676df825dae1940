mod health;
mod ingest;
mod query;
mod tasks;

pub use health::*;
pub use ingest::*;
pub use query::*;
pub use tasks::*;
