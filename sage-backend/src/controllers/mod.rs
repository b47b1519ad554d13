pub mod dag;
pub mod health;
pub mod query;
pub mod tools;
