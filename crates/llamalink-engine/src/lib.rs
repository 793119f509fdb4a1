//! # LlamaLink Engine
//!
//! Safe, typed handle over the precompiled `integrated_llm` native library.
//! The library does all the heavy lifting (model loading, tokenization,
//! inference, knowledge retrieval); this crate owns the FFI boundary:
//!
//! - loads the shared library at runtime and verifies its five entry points,
//! - converts host strings to NUL-terminated C strings and back,
//! - enforces call ordering (nothing reaches native code before a successful
//!   `init`),
//! - releases every native response buffer exactly once, on every exit path.
//!
//! The [`Engine`] is a plain caller-owned object with no internal locking.
//! Calls block until the native layer returns. Wrap it in a `Mutex` if it has
//! to be shared across threads.
//!
//! ```no_run
//! use llamalink_core::config::EngineConfig;
//! use llamalink_engine::Engine;
//!
//! # fn main() -> llamalink_core::Result<()> {
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.init("models/llama-2-7b-chat.Q2_K.gguf".as_ref())?;
//! engine.load_knowledge_file("my_faq.txt".as_ref())?;
//! if let Some(answer) = engine.query("What is the capital of France?")? {
//!     println!("{answer}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod ffi;

use std::ffi::{CStr, CString, c_char};
use std::path::{Path, PathBuf};

use llamalink_core::config::EngineConfig;
use llamalink_core::error::{LlamaLinkError, Result};

pub use ffi::{NativeLib, find_native_library, is_native_available};

/// The five native entry points, as one seam.
///
/// [`NativeLib`] is the production implementation; tests substitute a
/// recording mock so release discipline and call ordering stay checkable
/// without the real library installed.
pub trait NativeBackend {
    /// `init(model_path)` — returns the native status code (0 = success).
    fn init(&self, model_path: &CStr) -> Result<i32>;
    /// `add_knowledge(doc)` — ownership of the string transfers to native code.
    fn add_knowledge(&self, doc: &CStr) -> Result<()>;
    /// `load_knowledge_file(filepath)` — path forwarded verbatim; existence
    /// and format are validated only by the native layer.
    fn load_knowledge_file(&self, path: &CStr) -> Result<()>;
    /// `query(prompt)` — returns a native-owned C string, or null for
    /// "no answer". Every non-null pointer must be handed back exactly once
    /// via [`NativeBackend::free_response`].
    fn query(&self, prompt: &CStr) -> Result<*mut c_char>;
    /// `free_response(ptr)` — release a buffer returned by `query`.
    /// Must never be called with null.
    fn free_response(&self, ptr: *mut c_char);
}

/// Caller-owned handle to the native engine.
///
/// Created unloaded; [`Engine::init`] loads the library (if not injected) and
/// runs the native initializer. Knowledge and query operations fail with
/// [`LlamaLinkError::NotInitialized`] until init succeeds, without ever
/// touching native code.
pub struct Engine {
    config: EngineConfig,
    backend: Option<Box<dyn NativeBackend>>,
    /// Set on successful init; doubles as the initialized flag.
    model_path: Option<PathBuf>,
}

impl Engine {
    /// Create a new engine handle (native library not yet loaded).
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            backend: None,
            model_path: None,
        }
    }

    /// Create an engine over an already-constructed backend.
    pub fn with_backend(config: EngineConfig, backend: Box<dyn NativeBackend>) -> Self {
        Self {
            config,
            backend: Some(backend),
            model_path: None,
        }
    }

    /// Initialize the native engine with a model artifact.
    ///
    /// Loads the shared library on first use, then invokes the native
    /// initializer and checks its status code. A repeated call after success
    /// is a silent no-op and does not re-invoke native code. The model path
    /// is passed through unvalidated; the native layer decides whether it
    /// points at a usable artifact.
    pub fn init(&mut self, model_path: &Path) -> Result<()> {
        if self.is_initialized() {
            tracing::debug!("Engine already initialized, ignoring repeated init");
            return Ok(());
        }

        if self.backend.is_none() {
            let lib_path = self.resolve_library_path()?;
            self.backend = Some(Box::new(ffi::NativeLib::open(&lib_path)?));
        }
        let backend = self
            .backend
            .as_deref()
            .ok_or_else(|| LlamaLinkError::Library("No native backend".into()))?;

        let path_c = to_cstring(&model_path.to_string_lossy())?;
        let code = backend.init(&path_c)?;
        if code != 0 {
            return Err(LlamaLinkError::Init(code));
        }

        self.model_path = Some(model_path.to_path_buf());
        tracing::info!("Engine initialized: model={}", model_path.display());
        Ok(())
    }

    /// Add a knowledge string to the native knowledge base.
    ///
    /// The string is copied or consumed by native code; no reference is kept
    /// on this side.
    pub fn add_knowledge(&self, doc: &str) -> Result<()> {
        let backend = self.backend()?;
        let doc_c = to_cstring(doc)?;
        backend.add_knowledge(&doc_c)?;
        tracing::debug!("Knowledge entry added ({} bytes)", doc.len());
        Ok(())
    }

    /// Ask the native layer to load knowledge entries from a file.
    ///
    /// The on-disk format is the native library's own contract; the path is
    /// forwarded verbatim and not validated here.
    pub fn load_knowledge_file(&self, path: &Path) -> Result<()> {
        let backend = self.backend()?;
        if !path.exists() {
            tracing::warn!("Knowledge file not found locally: {}", path.display());
        }
        let path_c = to_cstring(&path.to_string_lossy())?;
        backend.load_knowledge_file(&path_c)?;
        tracing::info!("Knowledge file forwarded: {}", path.display());
        Ok(())
    }

    /// Query the engine with a prompt.
    ///
    /// `Ok(None)` means the native layer produced no answer (null response
    /// pointer); that is a valid result, not an error. Non-null responses are
    /// decoded as UTF-8 and released back to the native allocator exactly
    /// once, on the success path and the decode-failure path alike.
    pub fn query(&self, prompt: &str) -> Result<Option<String>> {
        let backend = self.backend()?;
        let prompt_c = to_cstring(prompt)?;

        let ptr = backend.query(&prompt_c)?;
        if ptr.is_null() {
            tracing::debug!("Query returned no answer");
            return Ok(None);
        }

        let response = ResponseGuard::new(ptr, backend);
        let text = response.decode()?;
        tracing::debug!("Query answered ({} bytes)", text.len());
        Ok(Some(text))
    }

    /// Whether the native initializer has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.model_path.is_some()
    }

    /// Human-readable engine state.
    pub fn info(&self) -> String {
        match &self.model_path {
            Some(model) => format!("LlamaLink engine: initialized (model={})", model.display()),
            None => "LlamaLink engine: not initialized".into(),
        }
    }

    /// Get the engine config.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn backend(&self) -> Result<&dyn NativeBackend> {
        if !self.is_initialized() {
            return Err(LlamaLinkError::NotInitialized);
        }
        self.backend
            .as_deref()
            .ok_or(LlamaLinkError::NotInitialized)
    }

    fn resolve_library_path(&self) -> Result<PathBuf> {
        if !self.config.library_path.is_empty() {
            return Ok(PathBuf::from(&self.config.library_path));
        }
        ffi::find_native_library().ok_or_else(|| {
            LlamaLinkError::Library(
                "Native library not found. Set engine.library_path in the config \
                 or install libintegrated_llm in a standard location"
                    .into(),
            )
        })
    }
}

/// Scoped ownership of a native response buffer.
///
/// Holds a non-null pointer returned by `query` and hands it back to the
/// native allocator exactly once, on drop. Decode failures still release.
struct ResponseGuard<'a> {
    ptr: *mut c_char,
    backend: &'a dyn NativeBackend,
}

impl<'a> ResponseGuard<'a> {
    fn new(ptr: *mut c_char, backend: &'a dyn NativeBackend) -> Self {
        debug_assert!(!ptr.is_null());
        Self { ptr, backend }
    }

    fn decode(&self) -> Result<String> {
        let bytes = unsafe { CStr::from_ptr(self.ptr) };
        bytes
            .to_str()
            .map(str::to_owned)
            .map_err(|e| LlamaLinkError::Decoding(format!("response is not valid UTF-8: {e}")))
    }
}

impl Drop for ResponseGuard<'_> {
    fn drop(&mut self) {
        self.backend.free_response(self.ptr);
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| LlamaLinkError::Encoding(format!("interior NUL byte: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Shared state inspected by tests after the backend moves into an Engine.
    #[derive(Default)]
    struct MockState {
        init_code: i32,
        response: Option<Vec<u8>>,
        calls: RefCell<Vec<String>>,
        frees: Cell<usize>,
    }

    struct MockBackend(Rc<MockState>);

    impl NativeBackend for MockBackend {
        fn init(&self, model_path: &CStr) -> Result<i32> {
            self.0
                .calls
                .borrow_mut()
                .push(format!("init:{}", model_path.to_string_lossy()));
            Ok(self.0.init_code)
        }

        fn add_knowledge(&self, doc: &CStr) -> Result<()> {
            self.0
                .calls
                .borrow_mut()
                .push(format!("add_knowledge:{}", doc.to_string_lossy()));
            Ok(())
        }

        fn load_knowledge_file(&self, path: &CStr) -> Result<()> {
            self.0
                .calls
                .borrow_mut()
                .push(format!("load_knowledge_file:{}", path.to_string_lossy()));
            Ok(())
        }

        fn query(&self, _prompt: &CStr) -> Result<*mut c_char> {
            self.0.calls.borrow_mut().push("query".into());
            match &self.0.response {
                Some(bytes) => {
                    let c = CString::new(bytes.clone()).expect("mock response has interior NUL");
                    Ok(c.into_raw())
                }
                None => Ok(std::ptr::null_mut()),
            }
        }

        fn free_response(&self, ptr: *mut c_char) {
            assert!(!ptr.is_null(), "free_response called with null");
            self.0.frees.set(self.0.frees.get() + 1);
            // Reclaim the allocation handed out by query.
            drop(unsafe { CString::from_raw(ptr) });
        }
    }

    fn engine_with(state: Rc<MockState>) -> Engine {
        Engine::with_backend(EngineConfig::default(), Box::new(MockBackend(state)))
    }

    fn initialized_engine(state: Rc<MockState>) -> Engine {
        let mut engine = engine_with(state);
        engine.init(Path::new("model.gguf")).unwrap();
        engine
    }

    #[test]
    fn test_ops_before_init_fail_locally() {
        let state = Rc::new(MockState::default());
        let engine = engine_with(state.clone());

        assert!(matches!(
            engine.add_knowledge("doc"),
            Err(LlamaLinkError::NotInitialized)
        ));
        assert!(matches!(
            engine.load_knowledge_file(Path::new("faq.txt")),
            Err(LlamaLinkError::NotInitialized)
        ));
        assert!(matches!(
            engine.query("hello"),
            Err(LlamaLinkError::NotInitialized)
        ));
        // The native layer was never contacted.
        assert!(state.calls.borrow().is_empty());
    }

    #[test]
    fn test_repeated_init_is_noop() {
        let state = Rc::new(MockState::default());
        let mut engine = engine_with(state.clone());

        engine.init(Path::new("model.gguf")).unwrap();
        engine.init(Path::new("other.gguf")).unwrap();

        assert!(engine.is_initialized());
        let inits = state
            .calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("init:"))
            .count();
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_init_failure_carries_status_code() {
        let state = Rc::new(MockState {
            init_code: 7,
            ..Default::default()
        });
        let mut engine = engine_with(state.clone());

        let err = engine.init(Path::new("model.gguf")).unwrap_err();
        assert!(matches!(err, LlamaLinkError::Init(7)));
        assert!(!engine.is_initialized());
        // Still not usable after a failed init.
        assert!(matches!(
            engine.query("hello"),
            Err(LlamaLinkError::NotInitialized)
        ));
    }

    #[test]
    fn test_query_decodes_and_releases_once() {
        let state = Rc::new(MockState {
            response: Some(b"Paris is the capital of France.".to_vec()),
            ..Default::default()
        });
        let engine = initialized_engine(state.clone());

        let answer = engine.query("What is the capital of France?").unwrap();
        assert_eq!(answer.as_deref(), Some("Paris is the capital of France."));
        assert_eq!(state.frees.get(), 1);
    }

    #[test]
    fn test_null_response_is_no_answer_and_no_release() {
        let state = Rc::new(MockState::default());
        let engine = initialized_engine(state.clone());

        assert_eq!(engine.query("anything").unwrap(), None);
        assert_eq!(state.frees.get(), 0);
    }

    #[test]
    fn test_invalid_utf8_response_fails_but_still_releases() {
        let state = Rc::new(MockState {
            response: Some(vec![0xff, 0xfe, 0xfd]),
            ..Default::default()
        });
        let engine = initialized_engine(state.clone());

        let err = engine.query("hello").unwrap_err();
        assert!(matches!(err, LlamaLinkError::Decoding(_)));
        assert_eq!(state.frees.get(), 1);
    }

    #[test]
    fn test_interior_nul_is_an_encoding_error() {
        let state = Rc::new(MockState::default());
        let engine = initialized_engine(state.clone());
        let calls_after_init = state.calls.borrow().len();

        let err = engine.add_knowledge("bad\0doc").unwrap_err();
        assert!(matches!(err, LlamaLinkError::Encoding(_)));
        // Nothing was forwarded to native code.
        assert_eq!(state.calls.borrow().len(), calls_after_init);
    }

    #[test]
    fn test_add_and_load_forward_after_init() {
        let state = Rc::new(MockState::default());
        let engine = initialized_engine(state.clone());

        engine.add_knowledge("The warranty lasts two years.").unwrap();
        engine.load_knowledge_file(Path::new("my_faq.txt")).unwrap();

        let calls = state.calls.borrow();
        assert!(
            calls.contains(&"add_knowledge:The warranty lasts two years.".to_string())
        );
        assert!(calls.contains(&"load_knowledge_file:my_faq.txt".to_string()));
    }

    #[test]
    fn test_info_reflects_state() {
        let state = Rc::new(MockState::default());
        let mut engine = engine_with(state);
        assert!(engine.info().contains("not initialized"));
        engine.init(Path::new("model.gguf")).unwrap();
        assert!(engine.info().contains("model.gguf"));
    }
}
