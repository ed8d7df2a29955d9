pub mod learning;
pub mod run;
pub mod status;
