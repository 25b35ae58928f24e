pub mod aws;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod operator_log;
pub mod password;
pub mod report;
pub mod schedule;
pub mod webhook;
pub mod workshop;
