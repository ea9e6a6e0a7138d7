//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod sources {
    pub use crate::sources::*;
}

pub mod storage {
    pub use crate::db_storage::*;
}
