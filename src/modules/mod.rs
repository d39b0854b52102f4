pub mod brain;
pub mod chat;
pub mod gateway;
pub mod ideas;
