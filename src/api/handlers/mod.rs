pub mod flow;
pub mod health;
