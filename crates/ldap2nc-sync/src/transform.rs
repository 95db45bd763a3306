//! Entry transformer boundary and the Rhai implementation.
//!
//! A transformer fills a [`UserDraft`] from a [`DirectoryEntry`]. It must not
//! perform I/O; it only sets fields and group ids on the draft.
//!
//! Scripts define `fn create(user, entry)` and `fn update(user, entry)` (and
//! optionally `fn test(user, entry)`), each returning the modified `user` map.

use std::path::Path;
use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope, AST};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use ldap2nc_directory::DirectoryEntry;
use ldap2nc_nextcloud::UserDraft;

use crate::mapper::{AttributeMapper, Category};

/// Default maximum number of operations in the Rhai engine.
const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Default maximum call stack depth.
const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 64;

/// Default maximum string size in bytes.
const DEFAULT_MAX_STRING_SIZE: usize = 65536;

/// Default maximum array size.
const DEFAULT_MAX_ARRAY_SIZE: usize = 10_000;

/// Default maximum map size.
const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

/// Operation a draft is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformOperation {
    Create,
    Update,
    /// Preview run of the `test-transform` command.
    Test,
}

impl TransformOperation {
    /// Script function name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformOperation::Create => "create",
            TransformOperation::Update => "update",
            TransformOperation::Test => "test",
        }
    }
}

impl std::fmt::Display for TransformOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot read transformer script {path}: {message}")]
    Io { path: String, message: String },

    #[error("transformer script does not compile: {0}")]
    Compile(String),

    #[error("transformer script has no function {0}(user, entry)")]
    MissingFunction(String),

    #[error("{operation} failed for {user}: {message}")]
    Script {
        operation: TransformOperation,
        user: String,
        message: String,
    },

    #[error("{operation} for {user} returned an invalid user: {message}")]
    InvalidResult {
        operation: TransformOperation,
        user: String,
        message: String,
    },
}

/// Fills a draft from a directory entry.
pub trait EntryTransformer: Send + Sync {
    fn transform(
        &self,
        operation: TransformOperation,
        draft: &mut UserDraft,
        entry: &DirectoryEntry,
    ) -> Result<(), TransformError>;

    /// Whether `operation` has a dedicated implementation.
    fn supports(&self, operation: TransformOperation) -> bool {
        operation != TransformOperation::Test
    }
}

/// Compiled-in transformers are plain closures.
impl<F> EntryTransformer for F
where
    F: Fn(TransformOperation, &mut UserDraft, &DirectoryEntry) -> Result<(), TransformError>
        + Send
        + Sync,
{
    fn transform(
        &self,
        operation: TransformOperation,
        draft: &mut UserDraft,
        entry: &DirectoryEntry,
    ) -> Result<(), TransformError> {
        self(operation, draft, entry)
    }
}

/// Resource limits for script execution.
#[derive(Debug, Clone)]
pub struct RhaiLimits {
    pub max_operations: u64,
    pub max_call_stack_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for RhaiLimits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_stack_depth: DEFAULT_MAX_CALL_STACK_DEPTH,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
        }
    }
}

/// Transformer backed by a sandboxed Rhai script.
///
/// The script sees the attribute mapper through `group_for(category, value)`,
/// `groups_for(entry)`, `group_name(group_id)` and `attribute_name(category)`,
/// and can log with `log_info`, `log_warn` and `log_debug`.
pub struct RhaiTransformer {
    engine: Engine,
    ast: AST,
    has_test: bool,
}

impl std::fmt::Debug for RhaiTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiTransformer")
            .field("has_test", &self.has_test)
            .finish_non_exhaustive()
    }
}

impl RhaiTransformer {
    /// Load and compile a script file.
    pub fn from_file(path: &Path, mapper: Arc<AttributeMapper>) -> Result<Self, TransformError> {
        let source = std::fs::read_to_string(path).map_err(|e| TransformError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(script = %path.display(), "Loaded transformer script");
        Self::from_script(&source, mapper, RhaiLimits::default())
    }

    /// Compile a script. `create` and `update` are required.
    pub fn from_script(
        source: &str,
        mapper: Arc<AttributeMapper>,
        limits: RhaiLimits,
    ) -> Result<Self, TransformError> {
        let engine = create_engine(mapper, &limits);
        let ast = engine
            .compile(source)
            .map_err(|e| TransformError::Compile(e.to_string()))?;

        let has_fn = |name: &str| {
            ast.iter_functions()
                .any(|f| f.name == name && f.params.len() == 2)
        };
        for required in [TransformOperation::Create, TransformOperation::Update] {
            if !has_fn(required.as_str()) {
                return Err(TransformError::MissingFunction(required.as_str().to_string()));
            }
        }
        let has_test = has_fn(TransformOperation::Test.as_str());

        Ok(Self {
            engine,
            ast,
            has_test,
        })
    }
}

impl EntryTransformer for RhaiTransformer {
    fn transform(
        &self,
        operation: TransformOperation,
        draft: &mut UserDraft,
        entry: &DirectoryEntry,
    ) -> Result<(), TransformError> {
        let script_error = |message: String| TransformError::Script {
            operation,
            user: draft.id.clone(),
            message,
        };

        let user = rhai::serde::to_dynamic(&*draft).map_err(|e| script_error(e.to_string()))?;
        let source = rhai::serde::to_dynamic(entry).map_err(|e| script_error(e.to_string()))?;

        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, operation.as_str(), (user, source))
            .map_err(|e| script_error(e.to_string()))?;

        let invalid = |message: String| TransformError::InvalidResult {
            operation,
            user: draft.id.clone(),
            message,
        };
        if result.is_unit() {
            return Err(invalid("function must return the user map".to_string()));
        }
        let mut updated: UserDraft =
            rhai::serde::from_dynamic(&result).map_err(|e| invalid(e.to_string()))?;

        if updated.id != draft.id {
            warn!(user = %draft.id, returned = %updated.id, "Transformer changed the user id, ignored");
            updated.id = draft.id.clone();
        }
        debug!(user = %updated.id, %operation, groups = ?updated.groups, "Transformed entry");
        *draft = updated;
        Ok(())
    }

    fn supports(&self, operation: TransformOperation) -> bool {
        operation != TransformOperation::Test || self.has_test
    }
}

/// Create a sandboxed Rhai engine with the mapper helpers registered.
fn create_engine(mapper: Arc<AttributeMapper>, limits: &RhaiLimits) -> Engine {
    let mut engine = Engine::new();

    // Set resource limits for sandbox
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_stack_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.set_strict_variables(true);

    engine.register_fn("log_info", |msg: &str| {
        info!(script_log = %msg, "Rhai script log");
    });
    engine.register_fn("log_warn", |msg: &str| {
        warn!(script_log = %msg, "Rhai script warning");
    });
    engine.register_fn("log_debug", |msg: &str| {
        debug!(script_log = %msg, "Rhai script debug");
    });

    let m = mapper.clone();
    engine.register_fn("group_for", move |category: &str, value: &str| -> Dynamic {
        category
            .parse::<Category>()
            .ok()
            .and_then(|c| m.lookup(c, value))
            .map_or(Dynamic::UNIT, |g| Dynamic::from(g.id.clone()))
    });

    let m = mapper.clone();
    engine.register_fn("group_name", move |group_id: &str| -> Dynamic {
        m.display_name(group_id)
            .map_or(Dynamic::UNIT, |name| Dynamic::from(name.to_string()))
    });

    let m = mapper.clone();
    engine.register_fn("attribute_name", move |category: &str| -> Dynamic {
        category
            .parse::<Category>()
            .ok()
            .and_then(|c| m.attribute_name(c))
            .map_or(Dynamic::UNIT, |a| Dynamic::from(a.to_string()))
    });

    let m = mapper;
    engine.register_fn("groups_for", move |entry: rhai::Map| -> rhai::Array {
        let attributes = entry
            .get("attributes")
            .and_then(|a| a.clone().try_cast::<rhai::Map>())
            .unwrap_or_default();
        m.groups_for_attributes(|name| script_values(&attributes, name))
            .into_iter()
            .map(Dynamic::from)
            .collect()
    });

    engine
}

/// Values of an attribute in the `entry.attributes` map seen by scripts.
fn script_values(attributes: &rhai::Map, name: &str) -> Vec<String> {
    attributes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.clone().try_cast::<rhai::Array>())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.into_string().ok())
        .collect()
}
