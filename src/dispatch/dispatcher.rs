/*!
 * Dispatcher
 * Builds native modules and owns the shared worker and helper channels
 */

use super::module::{ModuleParts, NativeModule};
use super::types::Isolation;
use crate::core::config::RuntimeConfig;
use crate::core::errors::RuntimeResult;
use crate::ffi::{BindingDescriptor, FfiBinder, LibraryBinder, RawCallables};
use crate::isolation::{ChannelState, ProcessChannel, ThreadChannel};
use crate::security::SafetyMetadata;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Entry point for binding and calling native libraries
pub struct Dispatcher {
    config: RuntimeConfig,
    binder: Arc<dyn LibraryBinder>,
    thread: Arc<ThreadChannel>,
    process: Arc<ProcessChannel>,
}

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

impl Dispatcher {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_binder(config, Arc::new(FfiBinder))
    }

    /// Dispatcher whose host and worker bindings come from `binder`
    pub fn with_binder(config: RuntimeConfig, binder: Arc<dyn LibraryBinder>) -> Self {
        let thread = Arc::new(ThreadChannel::new(Arc::clone(&binder), config.worker_cache_capacity));
        let process = Arc::new(ProcessChannel::new(config.clone()));
        info!(
            default_isolation = %config.default_isolation,
            helper = ?config.helper_path,
            "dispatcher initialized"
        );
        Self {
            config,
            binder,
            thread,
            process,
        }
    }

    /// Process-wide dispatcher configured from the environment
    pub fn global() -> &'static Dispatcher {
        GLOBAL.get_or_init(|| Dispatcher::new(RuntimeConfig::from_env()))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a module over callables the caller already bound
    pub fn wrap(
        &self,
        descriptor: BindingDescriptor,
        library_path: impl Into<String>,
        raw: RawCallables,
        isolation: Isolation,
    ) -> NativeModule {
        self.wrap_with_safety(descriptor, library_path, raw, isolation, None)
    }

    pub fn wrap_with_safety(
        &self,
        descriptor: BindingDescriptor,
        library_path: impl Into<String>,
        raw: RawCallables,
        isolation: Isolation,
        safety: Option<SafetyMetadata>,
    ) -> NativeModule {
        let library_path = library_path.into();
        debug!(library = %library_path, %isolation, functions = descriptor.len(), "wrapping module");
        NativeModule::new(ModuleParts {
            library_path,
            descriptor,
            isolation,
            safety,
            raw,
            thread: Arc::clone(&self.thread),
            process: Arc::clone(&self.process),
            debug: self.config.debug,
        })
    }

    /// Validate the descriptor, bind in the host unless process-isolated, and wrap
    pub fn load(
        &self,
        library_path: impl Into<String>,
        descriptor: BindingDescriptor,
        isolation: Isolation,
    ) -> RuntimeResult<NativeModule> {
        self.load_with_safety(library_path, descriptor, isolation, None)
    }

    pub fn load_with_safety(
        &self,
        library_path: impl Into<String>,
        descriptor: BindingDescriptor,
        isolation: Isolation,
        safety: Option<SafetyMetadata>,
    ) -> RuntimeResult<NativeModule> {
        let library_path = library_path.into();
        descriptor.resolve_all()?;

        let raw = match isolation {
            Isolation::Process => RawCallables::new(),
            _ => self.binder.bind(&library_path, &descriptor)?,
        };
        Ok(self.wrap_with_safety(descriptor, library_path, raw, isolation, safety))
    }

    /// `load` with the configured default isolation
    pub fn load_default(
        &self,
        library_path: impl Into<String>,
        descriptor: BindingDescriptor,
    ) -> RuntimeResult<NativeModule> {
        self.load(library_path, descriptor, self.config.default_isolation)
    }

    pub fn thread_state(&self) -> ChannelState {
        self.thread.state()
    }

    pub fn process_state(&self) -> ChannelState {
        self.process.state()
    }

    pub async fn helper_pid(&self) -> Option<u32> {
        self.process.helper_pid().await
    }

    /// Stop the worker and the helper; the next isolated call restarts them.
    /// Joins the worker thread, so queued worker calls finish first.
    pub async fn shutdown(&self) {
        self.thread.stop();
        self.process.stop().await;
        info!("dispatcher channels stopped");
    }
}
