pub mod check;
pub mod compile;
pub mod grammar;
pub mod infix;
pub mod literal;
pub mod lower;
pub mod resolve;
