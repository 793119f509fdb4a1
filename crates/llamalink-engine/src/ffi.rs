//! Raw surface of the `integrated_llm` native shared library.
//!
//! The library is a precompiled binary exposing five C entry points:
//!
//! ```c
//! int   init(const char* model_path);          // 0 on success
//! void  add_knowledge(const char* doc);
//! void  load_knowledge_file(const char* filepath);
//! char* query(const char* prompt);             // null = no answer
//! void  free_response(char* ptr);
//! ```
//!
//! Everything behind those symbols (model execution, tokenization, knowledge
//! indexing and retrieval) is opaque. This module only loads the library at
//! runtime and resolves the symbols; the safe surface lives in [`crate::Engine`].

use std::ffi::{CStr, c_char, c_int, c_void};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use llamalink_core::error::{LlamaLinkError, Result};

use crate::NativeBackend;

/// `int init(const char* model_path)` — 0 on success.
pub type InitFn = unsafe extern "C" fn(*const c_char) -> c_int;
/// `void add_knowledge(const char* doc)`
pub type AddKnowledgeFn = unsafe extern "C" fn(*const c_char);
/// `void load_knowledge_file(const char* filepath)`
pub type LoadKnowledgeFileFn = unsafe extern "C" fn(*const c_char);
/// `char* query(const char* prompt)` — null when there is no answer.
pub type QueryFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
/// `void free_response(char* ptr)` — releases a buffer returned by `query`.
pub type FreeResponseFn = unsafe extern "C" fn(*mut c_char);

const SYM_INIT: &[u8] = b"init\0";
const SYM_ADD_KNOWLEDGE: &[u8] = b"add_knowledge\0";
const SYM_LOAD_KNOWLEDGE_FILE: &[u8] = b"load_knowledge_file\0";
const SYM_QUERY: &[u8] = b"query\0";
const SYM_FREE_RESPONSE: &[u8] = b"free_response\0";

const ALL_SYMBOLS: [&[u8]; 5] = [
    SYM_INIT,
    SYM_ADD_KNOWLEDGE,
    SYM_LOAD_KNOWLEDGE_FILE,
    SYM_QUERY,
    SYM_FREE_RESPONSE,
];

/// Well-known install locations for the native library.
const LIBRARY_PATHS: [&str; 6] = [
    "/usr/local/lib/libintegrated_llm.so",
    "/usr/lib/libintegrated_llm.so",
    "/usr/local/lib/libintegrated_llm.dylib",
    "./libintegrated_llm.so",
    "./libintegrated_llm.dylib",
    "./integrated_llm.dll",
];

/// Probe the well-known locations for the native library.
pub fn find_native_library() -> Option<PathBuf> {
    LIBRARY_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

/// Check if the native library is available on the system.
pub fn is_native_available() -> bool {
    find_native_library().is_some()
}

/// A loaded native library with all five entry points verified present.
///
/// Dropping this unloads the library; the owning [`crate::Engine`] keeps it
/// alive for the lifetime of the handle.
pub struct NativeLib {
    lib: Library,
    path: PathBuf,
}

impl NativeLib {
    /// Load the shared library and verify the expected ABI.
    ///
    /// Fails with [`LlamaLinkError::Library`] if the file cannot be loaded or
    /// any of the five entry points is missing.
    pub fn open(path: &Path) -> Result<Self> {
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            LlamaLinkError::Library(format!("Failed to load {}: {e}", path.display()))
        })?;

        for name in ALL_SYMBOLS {
            unsafe { lib.get::<*const c_void>(name) }.map_err(|e| {
                LlamaLinkError::Library(format!(
                    "{} is missing symbol `{}`: {e}",
                    path.display(),
                    String::from_utf8_lossy(&name[..name.len() - 1]),
                ))
            })?;
        }

        tracing::debug!("Native library loaded: {}", path.display());
        Ok(Self {
            lib,
            path: path.to_path_buf(),
        })
    }

    /// Filesystem path this library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn symbol<T>(&self, name: &'static [u8]) -> Result<Symbol<'_, T>> {
        unsafe { self.lib.get(name) }.map_err(|e| {
            LlamaLinkError::Library(format!(
                "Failed to resolve symbol `{}`: {e}",
                String::from_utf8_lossy(&name[..name.len() - 1]),
            ))
        })
    }
}

impl NativeBackend for NativeLib {
    fn init(&self, model_path: &CStr) -> Result<i32> {
        let f: Symbol<'_, InitFn> = self.symbol(SYM_INIT)?;
        Ok(unsafe { f(model_path.as_ptr()) })
    }

    fn add_knowledge(&self, doc: &CStr) -> Result<()> {
        let f: Symbol<'_, AddKnowledgeFn> = self.symbol(SYM_ADD_KNOWLEDGE)?;
        unsafe { f(doc.as_ptr()) };
        Ok(())
    }

    fn load_knowledge_file(&self, path: &CStr) -> Result<()> {
        let f: Symbol<'_, LoadKnowledgeFileFn> = self.symbol(SYM_LOAD_KNOWLEDGE_FILE)?;
        unsafe { f(path.as_ptr()) };
        Ok(())
    }

    fn query(&self, prompt: &CStr) -> Result<*mut c_char> {
        let f: Symbol<'_, QueryFn> = self.symbol(SYM_QUERY)?;
        Ok(unsafe { f(prompt.as_ptr()) })
    }

    fn free_response(&self, ptr: *mut c_char) {
        // Symbol presence was verified in open(); a lookup failure here would
        // leak the buffer, which beats crashing mid-release.
        if let Ok(f) = self.symbol::<FreeResponseFn>(SYM_FREE_RESPONSE) {
            unsafe { f(ptr) };
        }
    }
}
