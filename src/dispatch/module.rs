/*!
 * Native Module
 * Callable surface of a bound library under one isolation mode
 *
 * Every descriptor name gets a routing entry when the module is built.
 * Names outside the descriptor go through `call` as well: in-process
 * modules report them missing, isolated modules forward them.
 */

use super::types::{Invocation, Isolation};
use crate::core::errors::{RuntimeError, RuntimeResult};
use crate::core::types::Value;
use crate::ffi::{BindingDescriptor, NativeFunction, RawCallables};
use crate::isolation::{CallFuture, ProcessChannel, ThreadChannel};
use crate::monitoring::CallSpan;
use crate::security::SafetyMetadata;
use futures::future::{self, FutureExt};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use tracing::{info, Instrument};

/// Route chosen for a descriptor name
#[derive(Clone)]
enum Entry {
    Direct(Arc<dyn NativeFunction>),
    Thread,
    Process,
}

impl Entry {
    fn label(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Thread => "worker",
            Self::Process => "process",
        }
    }
}

pub struct NativeModule {
    library_path: String,
    descriptor: Arc<BindingDescriptor>,
    isolation: Isolation,
    safety: Option<SafetyMetadata>,
    entries: BTreeMap<String, Entry>,
    raw: RawCallables,
    thread: Arc<ThreadChannel>,
    process: Arc<ProcessChannel>,
    debug: bool,
}

pub(crate) struct ModuleParts {
    pub library_path: String,
    pub descriptor: BindingDescriptor,
    pub isolation: Isolation,
    pub safety: Option<SafetyMetadata>,
    pub raw: RawCallables,
    pub thread: Arc<ThreadChannel>,
    pub process: Arc<ProcessChannel>,
    pub debug: bool,
}

impl NativeModule {
    pub(crate) fn new(parts: ModuleParts) -> Self {
        let ModuleParts {
            library_path,
            descriptor,
            isolation,
            safety,
            raw,
            thread,
            process,
            debug,
        } = parts;

        let mut entries = BTreeMap::new();
        for binding in descriptor.functions() {
            let entry = match isolation {
                Isolation::InProcess => match raw.get(&binding.name) {
                    Some(function) => Entry::Direct(Arc::clone(function)),
                    None => continue,
                },
                Isolation::Thread => match raw.get(&binding.name) {
                    Some(function) if !binding.prefers_async() => Entry::Direct(Arc::clone(function)),
                    _ => Entry::Thread,
                },
                Isolation::Process => Entry::Process,
            };
            entries.insert(binding.name.clone(), entry);
        }

        // Process isolation never runs native code in the host
        let raw = if isolation == Isolation::Process {
            RawCallables::new()
        } else {
            raw
        };

        Self {
            library_path,
            descriptor: Arc::new(descriptor),
            isolation,
            safety,
            entries,
            raw,
            thread,
            process,
            debug,
        }
    }

    fn route(&self, name: &str) -> Option<Entry> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry.clone());
        }
        match self.isolation {
            Isolation::InProcess => self.raw.get(name).map(|f| Entry::Direct(Arc::clone(f))),
            Isolation::Thread => Some(Entry::Thread),
            Isolation::Process => Some(Entry::Process),
        }
    }

    /// Call `name` with `args`
    ///
    /// The caller's location is attached to errors coming back from an
    /// isolated executor.
    #[track_caller]
    pub fn call(&self, name: &str, args: Vec<Value>) -> Invocation {
        let location = Location::caller();
        let callsite = format!("{}:{}:{}", location.file(), location.line(), location.column());
        self.dispatch(name, args, callsite)
    }

    fn dispatch(&self, name: &str, args: Vec<Value>, callsite: String) -> Invocation {
        let span = CallSpan::new(name, self.isolation);
        span.record_args_count(args.len());
        if let Some(safety) = &self.safety {
            span.record_trust(safety.trust.as_str());
        }

        let Some(entry) = self.route(name) else {
            let err = RuntimeError::MissingFunction {
                name: name.to_string(),
                exports: self.exports(),
            };
            span.record_error(&err.to_string());
            return Invocation::Ready(Err(err));
        };

        if self.debug {
            info!(trace_id = %span.trace_id(), function = %name, route = entry.label(), %callsite, "dispatching native call");
        }

        match entry {
            Entry::Direct(function) => {
                let result = span.span().in_scope(|| function.call(&args));
                record_outcome(&span, &result);
                if self.isolation.is_isolated() {
                    Invocation::Pending(future::ready(result).boxed())
                } else {
                    Invocation::Ready(result)
                }
            }
            Entry::Thread => {
                let future = self.thread.submit(
                    &self.library_path,
                    Arc::clone(&self.descriptor),
                    name,
                    args,
                    callsite,
                );
                Invocation::Pending(traced(future, span))
            }
            Entry::Process => {
                let future = self.process.submit(
                    &self.library_path,
                    Arc::clone(&self.descriptor),
                    self.safety.clone(),
                    name,
                    args,
                    callsite,
                );
                Invocation::Pending(traced(future, span))
            }
        }
    }

    /// Handle for a declared function
    pub fn get(&self, name: &str) -> Option<ModuleFunction<'_>> {
        self.descriptor.get(name).map(|binding| ModuleFunction {
            module: self,
            name: binding.name.as_str(),
        })
    }

    /// Declared function names
    pub fn exports(&self) -> Vec<String> {
        self.descriptor.names().map(String::from).collect()
    }

    /// C-like signature of a declared function
    pub fn signature(&self, name: &str) -> Option<String> {
        self.descriptor.get(name).map(|binding| binding.to_string())
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn library_path(&self) -> &str {
        &self.library_path
    }

    pub fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    pub fn safety(&self) -> Option<&SafetyMetadata> {
        self.safety.as_ref()
    }

    /// Whether `name` runs on the caller's thread
    pub fn is_direct(&self, name: &str) -> bool {
        matches!(self.route(name), Some(Entry::Direct(_)))
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: BTreeMap<&str, &str> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.label()))
            .collect();
        f.debug_struct("NativeModule")
            .field("library_path", &self.library_path)
            .field("isolation", &self.isolation)
            .field("routes", &routes)
            .finish()
    }
}

/// A declared function of a module
#[derive(Clone, Copy)]
pub struct ModuleFunction<'a> {
    module: &'a NativeModule,
    name: &'a str,
}

impl<'a> ModuleFunction<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[track_caller]
    pub fn call(&self, args: Vec<Value>) -> Invocation {
        let location = Location::caller();
        let callsite = format!("{}:{}:{}", location.file(), location.line(), location.column());
        self.module.dispatch(self.name, args, callsite)
    }
}

fn record_outcome(span: &CallSpan, result: &RuntimeResult<Value>) {
    match result {
        Ok(_) => span.record_result(true),
        Err(e) => span.record_error(&e.to_string()),
    }
}

fn traced(future: CallFuture, span: CallSpan) -> CallFuture {
    let tracing_span = span.span().clone();
    async move {
        let result = future.await;
        record_outcome(&span, &result);
        result
    }
    .instrument(tracing_span)
    .boxed()
}
