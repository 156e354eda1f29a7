mod config;
mod diff;
mod hydration;
mod session;
