pub mod close;
pub mod enqueue;
pub mod inspect;
pub mod master;
pub mod unit;
