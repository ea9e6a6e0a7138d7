// Domain-layer modules and shared errors/models
pub mod matching {
    pub use crate::extraction::*;
    pub use crate::matcher::*;
    pub use crate::normalize::*;
}

pub mod discovery {
    pub use crate::cascade::*;
    pub use crate::verifier::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
