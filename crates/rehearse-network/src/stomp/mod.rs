//! STOMP 1.2 프레임 코덱.

mod frame;

pub use frame::{Command, Frame};
