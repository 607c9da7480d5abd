#![deny(warnings)]

pub mod config;
pub mod decode;
pub mod features;
pub mod http;
pub mod model;
pub mod service;
