pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod errors;
pub mod runner;
pub mod scanner;
pub mod scripts;
pub mod supervisor;
