//! Event handler system.
//!
//! Add new event handlers by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_event;` below
//! 3. Subscribing the handler in `bot::dispatcher::build_dispatcher`

pub mod trigger;

pub use trigger::TriggerHandler;
