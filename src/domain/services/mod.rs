mod client_signals;

pub use client_signals::ClientSignals;
