pub mod automation;
pub mod credential;
pub mod record;
pub mod social;
pub mod workspace;
