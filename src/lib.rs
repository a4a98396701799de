// ABOUTME: Library crate for fleetmux exposing the monitor, device trust layer and HTTP surface

#![allow(missing_docs)]

pub mod audit;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod git;
pub mod models;
pub mod monitor;
pub mod server;
pub mod tmux;
