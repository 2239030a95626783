pub mod batch;
pub mod context;
pub mod dump;
pub mod query;
pub mod run;
pub mod show;
