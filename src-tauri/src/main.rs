#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_runtime;
mod app_types;
mod desktop_bridge_commands;
mod exit_events;
mod main_window;
mod update_flow;

pub(crate) use app_types::{AppState, BridgeResult};

fn main() {
    std::process::exit(app_runtime::run());
}
