pub mod db;
pub mod feed;

pub use db::DbAdapter;
pub use feed::relay_inserts;
