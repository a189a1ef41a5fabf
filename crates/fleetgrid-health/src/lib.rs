//! fleetgrid-health: readiness probing for new workers.
//!
//! A freshly started container is not routable until its service port
//! accepts TCP connections. The fleet manager calls a `Readiness`
//! implementation between "container started" and "worker running".
//!
//! ```text
//! attempt 1 ──fail──► sleep(delay) ──► attempt 2 ──fail──► ... attempt N ──► false
//!     └──ok──► true
//! ```

pub mod probe;

pub use probe::{probe, Readiness, TcpReadiness};
