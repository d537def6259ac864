//! Path normalization for adapter-facing names.
//!
//! Equivalent to `path.Clean(path.Join("/", name))`: collapses `//`,
//! resolves `.`/`..`, and guarantees a leading `/`. Implemented directly
//! rather than pulling in a dependency for this one routine.

/// Collapse `//`, resolve `.`/`..`, and prepend `/`, matching Go's
/// `path.Clean(path.Join("/", name))`.
pub fn normalize(raw: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for component in raw.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}
