//! Action identity: the normalized key that metric sets are cached under.
//!
//! Equality and hashing only look at the raw name, which is built from the
//! operation kind, resource, operation and HTTP method. Process id and the
//! parameter string ride along for diagnostics.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Maximum length (in characters) of a backend instance name.
pub const MAX_INSTANCE_NAME_CHARS: usize = 128;

/// Hex digits of the digest kept when a name has to be shortened.
const DIGEST_HEX_CHARS: usize = 16;

/// Characters kept from the full name when it has to be shortened.
/// One more character is used by the `~` separator.
const KEEP_CHARS: usize = MAX_INSTANCE_NAME_CHARS - DIGEST_HEX_CHARS - 1;

/// Immutable identity of one logical operation kind.
#[derive(Debug, Clone)]
pub struct ActionIdentity {
    category: Arc<str>,
    kind: Arc<str>,
    resource: Arc<str>,
    operation: Arc<str>,
    http_method: Arc<str>,
    parameters: Arc<str>,
    process_id: u32,

    raw_name: Arc<str>,
    sanitized_name: Arc<str>,
}

impl ActionIdentity {
    pub fn new(
        process_id: u32,
        category: impl Into<Arc<str>>,
        kind: impl Into<Arc<str>>,
        resource: impl Into<Arc<str>>,
        operation: impl Into<Arc<str>>,
        http_method: impl Into<Arc<str>>,
        parameters: impl Into<Arc<str>>,
    ) -> Self {
        let kind = kind.into();
        let resource = resource.into();
        let operation = operation.into();
        let http_method = http_method.into();

        let raw = raw_name(&kind, &resource, &operation, &http_method);
        let sanitized = sanitize_instance_name(&raw);

        Self {
            category: category.into(),
            kind,
            resource,
            operation,
            http_method,
            parameters: parameters.into(),
            process_id,
            raw_name: Arc::from(raw),
            sanitized_name: Arc::from(sanitized),
        }
    }

    pub fn category(&self) -> &str { &self.category }
    pub fn kind(&self) -> &str { &self.kind }
    pub fn resource(&self) -> &str { &self.resource }
    pub fn operation(&self) -> &str { &self.operation }
    pub fn http_method(&self) -> &str { &self.http_method }
    pub fn parameters(&self) -> &str { &self.parameters }
    pub fn process_id(&self) -> u32 { self.process_id }

    /// Deterministic descriptive name; the identity key.
    pub fn raw_name(&self) -> &str { &self.raw_name }

    /// Shared handle to the raw name (used as a cache key without cloning the string).
    pub fn raw_name_arc(&self) -> Arc<str> { Arc::clone(&self.raw_name) }

    /// Backend-safe instance name (at most 128 characters).
    pub fn sanitized_name(&self) -> &str { &self.sanitized_name }
}

impl PartialEq for ActionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.raw_name == other.raw_name
    }
}

impl Eq for ActionIdentity {}

impl Hash for ActionIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_name.hash(state);
    }
}

impl fmt::Display for ActionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_name)
    }
}

/// `"{kind} [{method}] {resource} {operation}"`
fn raw_name(kind: &str, resource: &str, operation: &str, http_method: &str) -> String {
    format!("{kind} [{http_method}] {resource} {operation}")
}

fn replace_illegal(c: char) -> char {
    match c {
        '(' => '[',
        ')' => ']',
        '#' | '/' | '\\' => '_',
        c if c.is_control() => '_',
        c => c,
    }
}

/// Turn a raw name into a backend instance name.
///
/// Illegal characters are replaced; names longer than
/// [`MAX_INSTANCE_NAME_CHARS`] keep a prefix and gain a `~` plus a digest
/// fragment of the full name, so distinct long names stay distinct.
/// The output is a fixed point: sanitizing it again returns it unchanged.
pub fn sanitize_instance_name(raw: &str) -> String {
    let replaced: String = raw.chars().map(replace_illegal).collect();
    if replaced.chars().count() <= MAX_INSTANCE_NAME_CHARS {
        return replaced;
    }

    let digest = Sha256::digest(replaced.as_bytes());
    let mut out: String = replaced.chars().take(KEEP_CHARS).collect();
    out.push('~');
    for b in digest.iter().take(DIGEST_HEX_CHARS / 2) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
