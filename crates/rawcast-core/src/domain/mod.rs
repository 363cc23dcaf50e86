//! Domain entities for rawcast.
//!
//! This module contains pure data types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core concepts of the application.
//! - Has **no** imports from OS APIs, network libraries, or UI frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Here the concepts are small: a *device* (an attached keyboard or mouse
//! identified by an OS handle) and an *event* (something that device did).

/// Attached input devices and their session-scoped identity.
pub mod device;

/// Normalized keyboard and mouse events.
pub mod event;
