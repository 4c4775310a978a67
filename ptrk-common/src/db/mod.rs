//! Database setup: connection pool, schema, migrations, lock retry

pub mod init;
pub mod migrations;
pub mod retry;

pub use init::*;
pub use migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};
pub use retry::retry_on_lock;
