pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod convert;
pub mod crawler;
pub mod domain;
pub mod download;
pub mod error;
pub mod fetch;
pub mod fits;
pub mod layout;
pub mod normalize;
pub mod npy;
pub mod output;
