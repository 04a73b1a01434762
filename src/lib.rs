pub mod config;
pub mod console;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod presence;
pub mod rest;
pub mod settings;
pub mod voice;
