// Draft engine: snake order mapping, events, picks, progression.

pub mod event;
pub mod pick;
pub mod snake;
pub mod state;
