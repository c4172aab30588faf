//! Remote procedure export table.
//!
//! An [`ExportTable`] maps operation names to type-erased adapters. Each
//! adapter receives the target object and a boxed argument tuple, checks the
//! tuple has exactly the operation's parameter types and calls the operation
//! through [`CallMethodWithTuple`]. Tables are usually built with
//! [`export_rpc!`](crate::export_rpc):
//!
//! ```
//! use syndic::{export_rpc, rpc::ExportTable};
//!
//! struct Echo;
//! impl Echo {
//!     fn echo(&self, text: String) -> String {
//!         text
//!     }
//!     fn join(&self, a: String, b: String) -> String {
//!         a + &b
//!     }
//! }
//!
//! let exports: ExportTable<Echo> = export_rpc!(Echo { echo, join });
//! let reply = exports
//!     .dispatch(&Echo, 1, "join", Box::new(("a".to_string(), "b".to_string())))
//!     .unwrap();
//! assert_eq!(*reply.downcast::<String>().unwrap(), "ab");
//! ```
//!
//! The identity of whoever issued the invocation is not part of the argument
//! tuple. The dispatcher installs it for the duration of the call and the
//! operation reads it back with [`current_caller`].

use std::{
    any::{type_name, Any},
    cell::Cell,
    collections::HashMap,
    fmt::{self, Debug, Formatter},
};

use thiserror::Error;
use tracing::{enabled, trace, Level};

use crate::{
    common::InstanceId,
    tuple::{CallMethodWithTuple, ForEachInTuple, Visit},
};

pub type Arguments = Box<dyn Any + Send>;
pub type Reply = Box<dyn Any + Send>;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no exported operation named `{0}`")]
    UnknownMethod(String),
    #[error("`{method}` expects arguments of type {expected}")]
    ArgumentMismatch {
        method: String,
        expected: &'static str,
    },
    #[error("`{method}` did not reply with {expected}")]
    ReplyMismatch {
        method: String,
        expected: &'static str,
    },
    #[error("dispatcher disconnected")]
    Disconnected,
}

thread_local! {
    static CALLER: Cell<Option<InstanceId>> = Cell::new(None);
}

/// The instance on whose behalf the current thread is running an exported
/// operation, or `None` outside of a dispatch.
pub fn current_caller() -> Option<InstanceId> {
    CALLER.with(Cell::get)
}

pub fn with_caller<R>(caller: InstanceId, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<InstanceId>);
    impl Drop for Restore {
        fn drop(&mut self) {
            CALLER.with(|current| current.set(self.0));
        }
    }

    let _restore = Restore(CALLER.with(|current| current.replace(Some(caller))));
    f()
}

type Adapter<T> = Box<dyn Fn(&T, Arguments) -> Result<Reply, RpcError> + Send + Sync>;

pub struct ExportTable<T> {
    adapter_table: HashMap<&'static str, Adapter<T>>,
}

impl<T> Default for ExportTable<T> {
    fn default() -> Self {
        Self {
            adapter_table: HashMap::new(),
        }
    }
}

impl<T> Debug for ExportTable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.adapter_table.keys()).finish()
    }
}

#[derive(Default)]
struct RenderArguments(Vec<String>);
impl Visit for RenderArguments {
    fn visit<V: Any + Debug>(&mut self, _index: usize, value: &V) {
        self.0.push(format!("{:?}", value));
    }
}

impl<T> ExportTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `method`, replacing any earlier export of
    /// the same name.
    pub fn export<Args, F>(mut self, method: &'static str, function: F) -> Self
    where
        T: 'static,
        F: CallMethodWithTuple<T, Args> + Send + Sync + 'static,
        F::Output: Send + 'static,
        Args: ForEachInTuple + Send + 'static,
    {
        let adapter = move |target: &T, args: Arguments| -> Result<Reply, RpcError> {
            let args = args
                .downcast::<Args>()
                .map_err(|_| RpcError::ArgumentMismatch {
                    method: method.to_string(),
                    expected: type_name::<Args>(),
                })?;
            if enabled!(Level::TRACE) {
                let mut render = RenderArguments::default();
                args.for_each_in_tuple(&mut render);
                trace!("{}({})", method, render.0.join(", "));
            }
            Ok(Box::new(function.call_method_with_tuple(target, *args)) as Reply)
        };
        self.adapter_table.insert(method, Box::new(adapter));
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.adapter_table.contains_key(method)
    }

    pub fn method_list(&self) -> Vec<&'static str> {
        let mut method_list: Vec<_> = self.adapter_table.keys().copied().collect();
        method_list.sort_unstable();
        method_list
    }

    pub fn dispatch(
        &self,
        target: &T,
        caller: InstanceId,
        method: &str,
        args: Arguments,
    ) -> Result<Reply, RpcError> {
        let adapter = self
            .adapter_table
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
        with_caller(caller, || adapter(target, args))
    }
}

pub fn downcast_reply<R: Any>(method: &str, reply: Reply) -> Result<R, RpcError> {
    reply
        .downcast::<R>()
        .map(|reply| *reply)
        .map_err(|_| RpcError::ReplyMismatch {
            method: method.to_string(),
            expected: type_name::<R>(),
        })
}

/// Build an [`ExportTable`] from a list of methods of one type.
#[macro_export]
macro_rules! export_rpc {
    ($target:ty { $($method:ident),* $(,)? }) => {
        $crate::rpc::ExportTable::<$target>::new()
            $(.export(stringify!($method), <$target>::$method))*
    };
}
