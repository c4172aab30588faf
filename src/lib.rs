//! Process coordination for a distributed component middleware: a name
//! registry for published transceivers, group membership, reusable group
//! barriers and a shutdown latch, served to remote processes through a
//! dispatching worker pool.
//!
//! The building blocks live in their own modules. [`spinlock`] and
//! [`spinlocked`] provide the lock and the lock-wrapped containers every
//! registry uses, [`tuple`] and [`rpc`] turn `(name, argument tuple)` pairs
//! into method calls, and [`service`] runs those calls on worker threads.

pub mod common;
pub mod coordinator;
pub mod facade;
pub mod latency;
pub mod launch;
pub mod rpc;
pub mod service;
pub mod spinlock;
pub mod spinlocked;
pub mod tuple;

pub use coordinator::Coordinator;

#[cfg(test)]
pub(crate) mod tests {
    use lazy_static::lazy_static;

    lazy_static! {
        pub static ref TRACING: () = tracing_subscriber::fmt::init();
    }
}
