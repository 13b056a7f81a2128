pub mod config;
pub mod error;
pub mod files;
pub mod imports;
pub mod locate;
pub mod printer;
pub mod reconcile;
pub mod rewrite;
pub mod stmt;
pub mod syntax;
