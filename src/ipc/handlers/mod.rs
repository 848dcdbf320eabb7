pub mod calc;
pub mod categories;
pub mod core;
pub mod grades;
pub mod reports;
pub mod setup;
