//! Process-wide GLSL to SPIR-V compiler.
//!
//! One shaderc compiler instance is shared by every filter in the process. It is
//! created when the first [`ShaderCompiler`] handle is acquired and destroyed when the
//! last handle is dropped. Acquire, release and every compile call take the same
//! global lock, so compilation is serialized process-wide.

use crate::error::{Result, YuvForgeError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Entry point name of every generated shader.
pub const SHADER_ENTRY_POINT: &str = "main";

/// Pipeline stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Compute shader.
    Compute,
}

impl From<ShaderStage> for shaderc::ShaderKind {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Compute => shaderc::ShaderKind::Compute,
        }
    }
}

/// A lazily created value guarded by a mutex and a reference count.
///
/// The value is built by the first `acquire` and dropped by the matching last `release`.
pub(crate) struct SharedSlot<T> {
    state: Mutex<SlotState<T>>,
}

struct SlotState<T> {
    value: Option<T>,
    refs: usize,
}

impl<T> SharedSlot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                refs: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference, building the value first if nobody holds one.
    pub(crate) fn acquire(&self, init: impl FnOnce() -> Result<T>) -> Result<()> {
        let mut state = self.lock();
        if state.refs == 0 {
            state.value = Some(init()?);
        }
        state.refs += 1;
        Ok(())
    }

    /// Take another reference on a value that is already alive.
    pub(crate) fn add_ref(&self) {
        self.lock().refs += 1;
    }

    /// Drop a reference, destroying the value when it was the last one.
    pub(crate) fn release(&self) {
        let mut state = self.lock();
        if state.refs == 0 {
            warn!("Shared slot released more often than acquired");
            return;
        }
        state.refs -= 1;
        if state.refs == 0 {
            state.value = None;
        }
    }

    /// Run `f` on the value while holding the lock.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> Result<R>) -> Result<R> {
        let state = self.lock();
        match state.value.as_ref() {
            Some(value) => f(value),
            None => Err(YuvForgeError::ShaderCompilation(
                "shared compiler is not initialized".to_string(),
            )),
        }
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.lock().refs
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.lock().value.is_some()
    }
}

/// Owned shaderc compiler stored in the process-wide slot.
struct CompilerCell {
    compiler: shaderc::Compiler,
}

// SAFETY: the compiler is only reached through `SharedSlot::with`, which holds the slot
// mutex for the whole call, so it is never used from two threads at once.
unsafe impl Send for CompilerCell {}

impl CompilerCell {
    fn new() -> Result<Self> {
        let compiler = shaderc::Compiler::new().ok_or_else(|| {
            YuvForgeError::ShaderCompilation("failed to create shaderc compiler".to_string())
        })?;
        debug!("Created shared shaderc compiler");
        Ok(Self { compiler })
    }

    fn compile(&self, source: &str, stage: ShaderStage, name: &str) -> Result<Vec<u32>> {
        let mut options = shaderc::CompileOptions::new().ok_or_else(|| {
            YuvForgeError::ShaderCompilation("failed to create compile options".to_string())
        })?;
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_2 as u32,
        );
        options.set_target_spirv(shaderc::SpirvVersion::V1_5);
        options.set_optimization_level(shaderc::OptimizationLevel::Performance);

        let artifact = self
            .compiler
            .compile_into_spirv(
                source,
                stage.into(),
                name,
                SHADER_ENTRY_POINT,
                Some(&options),
            )
            .map_err(|e| YuvForgeError::ShaderCompilation(e.to_string()))?;

        if artifact.get_num_warnings() > 0 {
            warn!(
                "Shader {} compiled with warnings: {}",
                name,
                artifact.get_warning_messages()
            );
        }

        Ok(artifact.as_binary().to_vec())
    }
}

static SHARED_COMPILER: SharedSlot<CompilerCell> = SharedSlot::new();

/// Handle to the process-wide shader compiler.
///
/// Cloning takes another reference; dropping the last handle destroys the compiler.
pub struct ShaderCompiler {
    _private: (),
}

impl ShaderCompiler {
    /// Acquire a handle, creating the shared compiler if this is the first one.
    pub fn acquire() -> Result<Self> {
        SHARED_COMPILER.acquire(CompilerCell::new)?;
        Ok(Self { _private: () })
    }

    /// Compile GLSL source into SPIR-V words.
    ///
    /// `name` only appears in diagnostics.
    pub fn compile(&self, source: &str, stage: ShaderStage, name: &str) -> Result<Vec<u32>> {
        SHARED_COMPILER.with(|cell| cell.compile(source, stage, name))
    }

    /// Number of live handles across the process.
    pub fn live_handles() -> usize {
        SHARED_COMPILER.ref_count()
    }
}

impl Clone for ShaderCompiler {
    fn clone(&self) -> Self {
        SHARED_COMPILER.add_ref();
        Self { _private: () }
    }
}

impl Drop for ShaderCompiler {
    fn drop(&mut self) {
        SHARED_COMPILER.release();
    }
}

impl std::fmt::Debug for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompiler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================
    // SharedSlot tests.
    // ========================

    #[test]
    fn test_slot_initializes_on_first_acquire_only() {
        let slot: SharedSlot<u32> = SharedSlot::new();
        let inits = AtomicUsize::new(0);
        let init = || {
            inits.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        };

        assert!(!slot.is_alive());
        slot.acquire(init).unwrap();
        slot.acquire(init).unwrap();
        slot.add_ref();

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(slot.ref_count(), 3);
        assert_eq!(slot.with(|v| Ok(*v)).unwrap(), 7);
    }

    #[test]
    fn test_slot_tears_down_on_last_release() {
        let slot: SharedSlot<String> = SharedSlot::new();
        slot.acquire(|| Ok("compiler".to_string())).unwrap();
        slot.acquire(|| Ok("unused".to_string())).unwrap();

        slot.release();
        assert!(slot.is_alive());
        assert_eq!(slot.with(|v| Ok(v.clone())).unwrap(), "compiler");

        slot.release();
        assert!(!slot.is_alive());
        assert_eq!(slot.ref_count(), 0);
        assert!(slot.with(|v| Ok(v.len())).is_err());
    }

    #[test]
    fn test_slot_reinitializes_after_teardown() {
        let slot: SharedSlot<u32> = SharedSlot::new();
        slot.acquire(|| Ok(1)).unwrap();
        slot.release();
        slot.acquire(|| Ok(2)).unwrap();
        assert_eq!(slot.with(|v| Ok(*v)).unwrap(), 2);
    }

    #[test]
    fn test_slot_failed_init_takes_no_reference() {
        let slot: SharedSlot<u32> = SharedSlot::new();
        let result = slot.acquire(|| {
            Err(YuvForgeError::ShaderCompilation("no compiler".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(slot.ref_count(), 0);
        assert!(!slot.is_alive());
    }

    #[test]
    fn test_slot_extra_release_is_ignored() {
        let slot: SharedSlot<u32> = SharedSlot::new();
        slot.release();
        assert_eq!(slot.ref_count(), 0);
    }

    // ========================
    // ShaderCompiler tests.
    // ========================

    #[test]
    fn test_compile_minimal_compute_shader() {
        let compiler = ShaderCompiler::acquire().unwrap();
        assert!(ShaderCompiler::live_handles() >= 1);

        let source = "#version 450\nlayout (local_size_x = 16, local_size_y = 16) in;\nvoid main() {}\n";
        let spirv = compiler
            .compile(source, ShaderStage::Compute, "minimal.comp")
            .unwrap();
        assert_eq!(spirv[0], 0x0723_0203);
    }

    #[test]
    fn test_compile_error_is_reported() {
        let compiler = ShaderCompiler::acquire().unwrap();
        let err = compiler
            .compile("#version 450\nvoid main() { nope }\n", ShaderStage::Compute, "bad.comp")
            .unwrap_err();
        assert!(matches!(err, YuvForgeError::ShaderCompilation(_)));
    }

    #[test]
    fn test_cloned_handle_keeps_compiler_alive() {
        let first = ShaderCompiler::acquire().unwrap();
        let second = first.clone();
        drop(first);
        let source = "#version 450\nlayout (local_size_x = 1) in;\nvoid main() {}\n";
        assert!(second
            .compile(source, ShaderStage::Compute, "clone.comp")
            .is_ok());
    }
}
