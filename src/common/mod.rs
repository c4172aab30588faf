pub mod config;

pub use config::{Config, ConfigError};

use std::{panic, process};

use thiserror::Error;

pub type InstanceId = u64;
// group ids live in the same space as instance ids
pub type TypeId = u64;

pub const INVALID_INSTANCE_ID: InstanceId = 0;
pub const INVALID_TYPE_ID: TypeId = 0;

/// A broken invariant, tagged with the source location that detected it.
///
/// Expected misses (unknown name, duplicate publish, ...) are never reported
/// through this type, they are plain `false` or sentinel return values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: {message}")]
pub struct LogicError {
    pub file: &'static str,
    pub line: u32,
    pub message: String,
}

#[macro_export]
macro_rules! logic_error {
    ($($arg:tt)*) => {
        $crate::common::LogicError {
            file: file!(),
            line: line!(),
            message: format!($($arg)*),
        }
    };
}

/// Abort the whole process when any thread panics. A coordinator whose worker
/// died mid-request may leave peers blocked in a barrier forever.
pub fn panic_abort() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        process::abort();
    }));
}

#[cfg(test)]
mod tests {
    #[test]
    fn logic_error_carries_location() {
        let error = logic_error!("group {} has no member", 42);
        assert_eq!(error.file, file!());
        assert!(error.line > 0);
        let message = error.to_string();
        assert!(message.starts_with(file!()));
        assert!(message.ends_with(": group 42 has no member"));
    }
}
