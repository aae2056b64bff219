//! steer_sched - Hybrid real-time/fair scheduler with CPU steering.
//!
//! Decides which runnable thread runs next on each CPU and steers
//! latency-sensitive transaction handlers onto the most suitable CPU of a
//! big/little system, based on live per-CPU telemetry.
//!
//! # Architecture
//!
//! - **Scheduler**: real-time FIFO levels and a vruntime-ordered fair
//!   queue behind one short-held lock; sleep, wake, yield and affinity
//! - **Timers**: registration table of typed wake and slice-end timers
//! - **Steering**: preferred-CPU selection and priority-to-CPU mapping
//! - **Optimizer**: per-transaction pinning with little-to-big promotion
//! - **Context**: boot-time wiring of all of the above
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use steer_sched::*;
//! use steer_utils::CpuTopology;
//!
//! let topology = CpuTopology::from_capacities(&[512, 512, 1024, 1024]).unwrap();
//! let ctx = SchedContext::builder(topology)
//!     .clock(Arc::new(ManualClock::new()))
//!     .thread(ThreadDescriptor::new(ThreadId(1), Priority::AUDIO))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(ctx.scheduler().schedule(0).unwrap(), Some(ThreadId(1)));
//! assert_eq!(ctx.optimize(ThreadId(1), Priority::AUDIO), 2);
//! ```

pub mod affinity;
pub mod clock;
pub mod context;
pub mod error;
pub mod optimizer;
pub mod runqueue;
pub mod sched;
pub mod steering;
pub mod thread;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::{ContextBuilder, SchedContext};
pub use error::SchedError;
pub use optimizer::{AffinityOptimizer, OptimizerStats};
pub use sched::{SchedConfig, SchedStats, Scheduler};
pub use steering::{SteeringConfig, SteeringPolicy};
pub use thread::{ThreadDescriptor, ThreadSnapshot, ThreadState};
pub use timer::{TimerId, TimerKind, TimerTable};
pub use types::{Priority, SchedClass, ThreadId, TimeNs, Vruntime};
