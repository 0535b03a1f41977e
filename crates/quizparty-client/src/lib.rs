pub mod health;
pub mod network;
pub mod readiness;
pub mod status;
