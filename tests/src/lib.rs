//! # Multi-Topic Consumer Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs      # Receive, ack routing, retry routing scenarios
//!     └── lifecycle.rs  # Construction, unsubscribe and close behavior
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p mq-tests
//!
//! # By category
//! cargo test -p mq-tests integration::flows::
//! cargo test -p mq-tests integration::lifecycle::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
