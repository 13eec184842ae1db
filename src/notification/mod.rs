pub mod email;
pub mod retry;
pub mod webhook;
