//! TUI module for terminal user interfaces

mod probe_monitor;

pub use probe_monitor::ProbeMonitorApp;
