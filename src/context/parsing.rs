use super::{ContextError, ResourceKind};

/// Extract just the resource name from either "name" or "kind/name" format
///
/// - `"ephemera-server-1a2b"` → `"ephemera-server-1a2b"`
/// - `"pod/ephemera-server-1a2b"` → `"ephemera-server-1a2b"`
#[must_use]
pub fn extract_resource_name(reference: &str) -> &str {
    reference.split('/').next_back().unwrap_or(reference)
}

/// Parse a kind name or alias into a [`ResourceKind`]
///
/// # Errors
///
/// Returns `ContextError::InvalidResourceRef` for unknown kinds.
pub fn parse_kind(kind: &str) -> Result<ResourceKind, ContextError> {
    kind.parse().map_err(ContextError::InvalidResourceRef)
}

/// Parse a resource reference like "pod/client" into (kind, name)
///
/// # Errors
///
/// Returns `ContextError::InvalidResourceRef` if the reference format is invalid.
pub fn parse_resource_ref(reference: &str) -> Result<(ResourceKind, &str), ContextError> {
    let Some((kind, name)) = reference.split_once('/') else {
        return Err(ContextError::InvalidResourceRef(format!(
            "expected 'kind/name', got '{reference}'"
        )));
    };

    if name.is_empty() {
        return Err(ContextError::InvalidResourceRef(format!(
            "resource name cannot be empty in '{reference}'"
        )));
    }

    let kind = parse_kind(kind).map_err(|_| {
        ContextError::InvalidResourceRef(format!("unknown resource kind '{kind}' in '{reference}'"))
    })?;

    Ok((kind, name))
}

/// Build the canonical `{prefix}-{role}-{random}` name
pub(crate) fn compose_name(prefix: &str, role: &str, random: &str) -> String {
    format!("{prefix}-{role}-{random}")
}
