#![allow(clippy::result_large_err)]

pub mod asserter;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod fixture;
pub mod mercado;
pub mod outputter;
pub mod parser;
pub mod path;
pub mod reporter;
pub mod request;
pub mod runner;
pub mod schema;
pub mod shape;
pub mod validator;
