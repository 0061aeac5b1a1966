pub mod preprocess;
pub mod run;
