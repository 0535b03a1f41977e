pub mod protocol;
pub mod retry;
pub mod room;
pub mod round;
pub mod rules;
